//! `checkProcessHealth`, §4.6.

use std::time::{Duration, Instant};

use command::ContainerExec;
use pinacle_client::entities::spec::ProcessSpec;

const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// No health check configured is always healthy. Existing-repo pods
/// never execute the check at all — the process is assumed to already
/// be in whatever state the repo left it in. Otherwise loops the health
/// check until it succeeds or `timeout` elapses, sleeping
/// [`RETRY_INTERVAL`] between attempts.
pub async fn check_process_health(
  exec: &impl ContainerExec,
  working_dir: &str,
  process: &ProcessSpec,
  is_existing_repo: bool,
  timeout: Duration,
) -> anyhow::Result<bool> {
  let Some(health_check) = &process.config.health_check else {
    return Ok(true);
  };
  if is_existing_repo {
    return Ok(true);
  }

  let wrapped = format!("cd {} && {health_check}", command::quote_arg(working_dir));
  let deadline = Instant::now() + timeout;

  loop {
    let output = exec.exec_in_pod(&["sh", "-c", wrapped.as_str()]).await?;
    if output.success() {
      return Ok(true);
    }
    if Instant::now() >= deadline {
      return Ok(false);
    }
    tokio::time::sleep(RETRY_INTERVAL).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::docker::ExecOutput;
  use pinacle_client::entities::pod::{ProcessConfig, StartCommand};
  use std::sync::atomic::{AtomicU32, Ordering};

  struct SucceedsAfter {
    remaining_failures: AtomicU32,
  }

  impl ContainerExec for SucceedsAfter {
    async fn exec_in_pod(&self, _argv: &[&str]) -> anyhow::Result<ExecOutput> {
      let remaining = self.remaining_failures.fetch_update(
        Ordering::SeqCst,
        Ordering::SeqCst,
        |n| if n > 0 { Some(n - 1) } else { Some(0) },
      ).unwrap();
      let exit_code = if remaining > 0 { 1 } else { 0 };
      Ok(ExecOutput { stdout: String::new(), stderr: String::new(), exit_code })
    }
  }

  fn process_with_health(health_check: Option<String>) -> ProcessSpec {
    ProcessSpec {
      config: ProcessConfig {
        name: "web".to_string(),
        start_command: StartCommand::Single("pnpm dev".to_string()),
        url: None,
        health_check,
      },
      session_name: "process-pod1-web".to_string(),
    }
  }

  #[tokio::test]
  async fn no_health_check_is_always_healthy() {
    let exec = SucceedsAfter { remaining_failures: AtomicU32::new(0) };
    let process = process_with_health(None);
    let healthy = check_process_health(&exec, "/workspace", &process, false, Duration::from_millis(10))
      .await
      .unwrap();
    assert!(healthy);
  }

  #[tokio::test]
  async fn existing_repo_skips_the_check_entirely() {
    let exec = SucceedsAfter { remaining_failures: AtomicU32::new(100) };
    let process = process_with_health(Some("curl -fsS http://localhost".to_string()));
    let healthy = check_process_health(&exec, "/workspace", &process, true, Duration::from_millis(10))
      .await
      .unwrap();
    assert!(healthy);
  }

  #[tokio::test]
  async fn retries_until_success_within_timeout() {
    let exec = SucceedsAfter { remaining_failures: AtomicU32::new(1) };
    let process = process_with_health(Some("curl -fsS http://localhost".to_string()));
    let healthy = check_process_health(&exec, "/workspace", &process, false, Duration::from_secs(5))
      .await
      .unwrap();
    assert!(healthy);
  }

  #[tokio::test]
  async fn times_out_if_never_healthy() {
    let exec = SucceedsAfter { remaining_failures: AtomicU32::new(1000) };
    let process = process_with_health(Some("curl -fsS http://localhost".to_string()));
    let healthy = check_process_health(&exec, "/workspace", &process, false, Duration::from_millis(1))
      .await
      .unwrap();
    assert!(!healthy);
  }
}
