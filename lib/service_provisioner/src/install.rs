//! `provision one service`, §4.5: run install steps once per pod
//! (idempotent), write the process-supervisor unit for the service's
//! start command, mark it enabled.

use command::ContainerExec;
use pinacle_client::entities::spec::{PodSpec, ServiceSpec};

use crate::unit::write_unit_file;
use crate::{ServiceOpResult, entry_for, run};

const WORKSPACE: &str = "/workspace";

/// Installs and enables a service. Install steps are themselves written
/// to be idempotent (`command -v x || install x`), so re-running
/// `provision_service` against an already-provisioned pod is safe — this
/// is what lets `createPod` be retried after a partial failure.
pub async fn provision_service(
  exec: &impl ContainerExec,
  pod_id: &str,
  spec: &PodSpec,
  service: &ServiceSpec,
) -> anyhow::Result<ServiceOpResult> {
  let entry = entry_for(&service.name)?;
  let mut logs = Vec::new();

  for (i, step) in entry.definition.install_steps.iter().enumerate() {
    let label = format!("Install {} ({}/{})", service.name, i + 1, entry.definition.install_steps.len());
    logs.push(run(exec, pod_id, &label, WORKSPACE, step).await);
  }

  let start_command = (entry.start_command)(spec, service);
  let write_log = write_unit_file(exec, pod_id, &service.name, &start_command).await;
  logs.push(write_log);

  let result = ServiceOpResult { logs };
  if !result.success() {
    anyhow::bail!("service `{}` install/enable failed", service.name);
  }
  Ok(result)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::docker::ExecOutput;
  use pinacle_client::entities::spec::{NetworkSpec, ProcessSpec, ResourceSpec, ServiceSpec};
  use std::collections::HashMap;
  use std::sync::Mutex;

  struct RecordingExec {
    calls: Mutex<Vec<String>>,
  }

  impl ContainerExec for RecordingExec {
    async fn exec_in_pod(&self, argv: &[&str]) -> anyhow::Result<ExecOutput> {
      self.calls.lock().unwrap().push(argv.join(" "));
      Ok(ExecOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 })
    }
  }

  fn sample_spec() -> PodSpec {
    PodSpec {
      id: "pod1".to_string(),
      name: "app".to_string(),
      slug: "app".to_string(),
      base_image: "pinacle/base:latest".to_string(),
      template: None,
      resources: ResourceSpec { cpu_cores: 1.0, memory_mb: 1024, storage_mb: 10240 },
      network: NetworkSpec::default(),
      services: vec![],
      install_command: None,
      processes: Vec::<ProcessSpec>::new(),
      environment: HashMap::new(),
      github_repo: None,
      github_branch: None,
      github_repo_setup: None,
      working_dir: PodSpec::DEFAULT_WORKING_DIR.to_string(),
      user: PodSpec::DEFAULT_USER.to_string(),
      tabs: vec![],
      tier: "dev.small".to_string(),
    }
  }

  #[tokio::test]
  async fn runs_every_install_step_then_writes_unit() {
    let exec = RecordingExec { calls: Mutex::new(Vec::new()) };
    let service = ServiceSpec {
      name: "web-terminal".to_string(),
      ports: vec![],
      environment: HashMap::new(),
      auto_restart: true,
      depends_on: vec![],
    };
    let result =
      provision_service(&exec, "pod1", &sample_spec(), &service).await.unwrap();
    assert!(result.success());
    let calls = exec.calls.lock().unwrap();
    assert!(calls.iter().any(|c| c.contains("ttyd")));
    assert!(calls.iter().any(|c| c.contains("supervisor")));
  }
}
