//! `injectPinacleConfig`, §4.7: writes the declarative config's YAML
//! form to `/workspace/pinacle.yaml`, unless the cloned/initialized
//! repository already shipped one (a repo that came with its own
//! `pinacle.yaml` owns that file from then on).

use command::{ContainerExec, quote_arg};
use pinacle_client::entities::pod::DeclarativeConfig;

use crate::{GitRes, run};

const WORKSPACE: &str = "/workspace";
const CONFIG_PATH: &str = "/workspace/pinacle.yaml";

/// Writes `config` as `pinacle.yaml`, logging a single Command Log row
/// either way: a no-op row if a config file already exists, the write
/// itself otherwise.
pub async fn inject_pinacle_config(
  pod_id: &str,
  config: &DeclarativeConfig,
  exec: &impl ContainerExec,
) -> anyhow::Result<GitRes> {
  let check = run(
    exec,
    pod_id,
    "Check Existing Config",
    WORKSPACE,
    "test -f pinacle.yaml",
  )
  .await;
  if check.success() {
    return Ok(GitRes { logs: vec![check], hash: None, message: None });
  }

  let yaml = config.to_yaml()?;
  let write_cmd =
    format!("printf '%s' {} > {}", quote_arg(&yaml), quote_arg(CONFIG_PATH));
  let log = run(exec, pod_id, "Write pinacle.yaml", WORKSPACE, &write_cmd).await;
  let success = log.success();
  let logs = vec![check, log];
  if !success {
    anyhow::bail!("failed to write pinacle.yaml");
  }
  Ok(GitRes { logs, hash: None, message: None })
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::docker::ExecOutput;
  use std::sync::Mutex;

  struct RecordingExec {
    calls: Mutex<Vec<String>>,
    existing_config: bool,
  }

  impl ContainerExec for RecordingExec {
    async fn exec_in_pod(
      &self,
      argv: &[&str],
    ) -> anyhow::Result<ExecOutput> {
      let joined = argv.join(" ");
      self.calls.lock().unwrap().push(joined.clone());
      let is_check = joined.contains("test -f pinacle.yaml");
      let success = if is_check { self.existing_config } else { true };
      Ok(ExecOutput {
        stdout: String::new(),
        stderr: String::new(),
        exit_code: if success { 0 } else { 1 },
      })
    }
  }

  fn sample_config() -> DeclarativeConfig {
    DeclarativeConfig {
      version: "1.0".to_string(),
      tier: "dev.small".to_string(),
      services: vec!["web-terminal".to_string()],
      template: None,
      install: None,
      processes: vec![],
      tabs: vec![],
    }
  }

  #[tokio::test]
  async fn writes_config_when_none_exists() {
    let exec =
      RecordingExec { calls: Mutex::new(Vec::new()), existing_config: false };
    let res = inject_pinacle_config("pod1", &sample_config(), &exec)
      .await
      .unwrap();
    assert!(res.success());
    let calls = exec.calls.lock().unwrap();
    assert!(calls.iter().any(|c| c.contains("pinacle.yaml")));
    assert_eq!(calls.len(), 2);
  }

  #[tokio::test]
  async fn skips_write_when_config_already_present() {
    let exec =
      RecordingExec { calls: Mutex::new(Vec::new()), existing_config: true };
    let res = inject_pinacle_config("pod1", &sample_config(), &exec)
      .await
      .unwrap();
    assert!(res.success());
    let calls = exec.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
  }
}
