use anyhow::Context;
use command::{ContainerExec, quote_arg};
use pinacle_client::entities::dotenv::DotenvRecord;

/// Writes a pod's resolved env file into its container, per step 7 of the
/// provisioning sequence: the file lands at `env_file_path` (relative to
/// the working directory the container was created with) before any
/// install command or process runs, so both can read it.
///
/// Returns `Err` if the write inside the container fails; callers attach
/// the error to the pod's Command Log the same way any other failed
/// provisioning step does.
pub async fn write_env_file(
  dotenv: &DotenvRecord,
  env_file_path: &str,
  exec: &impl ContainerExec,
) -> anyhow::Result<()> {
  let contents = dotenv.to_env_file_contents();
  write_env_file_contents(&contents, env_file_path, exec).await
}

/// Same as [`write_env_file`], but for callers that have already
/// resolved the file's contents (e.g. after variable/secret
/// interpolation) rather than a raw [`DotenvRecord`].
pub async fn write_env_file_contents(
  contents: &str,
  env_file_path: &str,
  exec: &impl ContainerExec,
) -> anyhow::Result<()> {
  // `printf '%s'` rather than `echo`: avoids any ambiguity around
  // trailing newlines or `-e`/backslash interpretation across shells.
  let argv = [
    "sh",
    "-c",
    &format!(
      "printf '%s' {} > {}",
      quote_arg(contents),
      quote_arg(env_file_path)
    ),
  ];
  let output = exec
    .exec_in_pod(&argv)
    .await
    .context("failed to write env file into pod container")?;
  if !output.success() {
    anyhow::bail!(
      "writing env file exited with code {}: {}",
      output.exit_code,
      output.stderr
    );
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::EnvironmentVar;
  use pinacle_client::entities::docker::ExecOutput;
  use std::sync::Mutex;

  struct RecordingExec {
    calls: Mutex<Vec<Vec<String>>>,
  }

  impl ContainerExec for RecordingExec {
    async fn exec_in_pod(
      &self,
      argv: &[&str],
    ) -> anyhow::Result<ExecOutput> {
      self
        .calls
        .lock()
        .unwrap()
        .push(argv.iter().map(|s| s.to_string()).collect());
      Ok(ExecOutput {
        stdout: String::new(),
        stderr: String::new(),
        exit_code: 0,
      })
    }
  }

  #[tokio::test]
  async fn writes_env_file_via_container_exec() {
    let dotenv = DotenvRecord {
      variables: vec![EnvironmentVar {
        variable: "FOO".into(),
        value: "bar baz".into(),
      }],
      ..Default::default()
    };
    let exec = RecordingExec { calls: Mutex::new(Vec::new()) };
    write_env_file(&dotenv, "/workspace/.env", &exec).await.unwrap();
    let calls = exec.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let joined = calls[0].join(" ");
    assert!(joined.contains("/workspace/.env"));
    assert!(joined.contains("FOO=bar baz"));
  }

  #[tokio::test]
  async fn surfaces_nonzero_exit_as_error() {
    struct FailingExec;
    impl ContainerExec for FailingExec {
      async fn exec_in_pod(
        &self,
        _argv: &[&str],
      ) -> anyhow::Result<ExecOutput> {
        Ok(ExecOutput {
          stdout: String::new(),
          stderr: "permission denied".into(),
          exit_code: 1,
        })
      }
    }
    let err =
      write_env_file_contents("FOO=bar", "/workspace/.env", &FailingExec)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("permission denied"));
  }
}
