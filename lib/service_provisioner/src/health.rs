//! Health checking, §4.5: execute the registry's health-check command;
//! non-zero exit is unhealthy. [`check_service_health`] answers a single
//! point-in-time question with no retry; [`wait_for_service_healthy`] is
//! `start_service`'s own retry loop, since §4.5 requires a service to
//! "fail if not healthy after the configured start delay and retries."

use std::time::Duration;

use command::ContainerExec;
use pinacle_client::entities::spec::{PodSpec, ServiceSpec};

use crate::entry_for;

const WORKSPACE: &str = "/workspace";

/// Time between retry attempts in [`wait_for_service_healthy`]. A fixed
/// constant in production use; tests drive the loop with a tiny
/// `retry_interval` argument instead of waiting on this one.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

pub async fn check_service_health(
  exec: &impl ContainerExec,
  spec: &PodSpec,
  service: &ServiceSpec,
) -> anyhow::Result<bool> {
  let entry = entry_for(&service.name)?;
  let health_command = (entry.health_check)(spec, service);
  let wrapped = format!("cd {} && {health_command}", command::quote_arg(WORKSPACE));
  let output = exec.exec_in_pod(&["sh", "-c", wrapped.as_str()]).await?;
  Ok(output.success())
}

/// Waits `start_delay`, then checks health, retrying up to `retries`
/// more times `retry_interval` apart before giving up. Mirrors
/// [`process_provisioner`]'s `check_process_health` retry loop; the
/// caller (`PodManager::create_pod_pipeline`/`start_pod`) is expected to
/// turn a final `false` into `CoreError::ServiceStartFailed`.
pub async fn wait_for_service_healthy(
  exec: &impl ContainerExec,
  spec: &PodSpec,
  service: &ServiceSpec,
  start_delay: Duration,
  retries: u32,
  retry_interval: Duration,
) -> anyhow::Result<bool> {
  tokio::time::sleep(start_delay).await;

  let mut attempts_left = retries + 1;
  loop {
    if check_service_health(exec, spec, service).await? {
      return Ok(true);
    }
    attempts_left -= 1;
    if attempts_left == 0 {
      return Ok(false);
    }
    tokio::time::sleep(retry_interval).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::docker::ExecOutput;
  use pinacle_client::entities::spec::{NetworkSpec, ProcessSpec, ResourceSpec};
  use std::collections::HashMap;

  struct FixedExec {
    exit_code: i32,
  }

  impl ContainerExec for FixedExec {
    async fn exec_in_pod(&self, _argv: &[&str]) -> anyhow::Result<ExecOutput> {
      Ok(ExecOutput { stdout: String::new(), stderr: String::new(), exit_code: self.exit_code })
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

  fn sample_service() -> ServiceSpec {
    ServiceSpec {
      name: "postgres".to_string(),
      ports: vec![],
      environment: HashMap::new(),
      auto_restart: true,
      depends_on: vec![],
    }
  }

  #[tokio::test]
  async fn healthy_on_zero_exit() {
    let exec = FixedExec { exit_code: 0 };
    assert!(check_service_health(&exec, &sample_spec(), &sample_service()).await.unwrap());
  }

  #[tokio::test]
  async fn unhealthy_on_nonzero_exit() {
    let exec = FixedExec { exit_code: 3 };
    assert!(!check_service_health(&exec, &sample_spec(), &sample_service()).await.unwrap());
  }

  struct SucceedsAfter {
    remaining_failures: std::sync::atomic::AtomicU32,
  }

  impl ContainerExec for SucceedsAfter {
    async fn exec_in_pod(&self, _argv: &[&str]) -> anyhow::Result<ExecOutput> {
      use std::sync::atomic::Ordering;
      let remaining = self
        .remaining_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n > 0 { Some(n - 1) } else { Some(0) })
        .unwrap();
      let exit_code = if remaining > 0 { 1 } else { 0 };
      Ok(ExecOutput { stdout: String::new(), stderr: String::new(), exit_code })
    }
  }

  #[tokio::test]
  async fn wait_for_healthy_retries_until_success() {
    let exec = SucceedsAfter { remaining_failures: std::sync::atomic::AtomicU32::new(2) };
    let healthy = wait_for_service_healthy(
      &exec,
      &sample_spec(),
      &sample_service(),
      Duration::from_millis(1),
      3,
      Duration::from_millis(1),
    )
    .await
    .unwrap();
    assert!(healthy);
  }

  #[tokio::test]
  async fn wait_for_healthy_gives_up_after_retries_exhausted() {
    let exec = FixedExec { exit_code: 1 };
    let healthy = wait_for_service_healthy(
      &exec,
      &sample_spec(),
      &sample_service(),
      Duration::from_millis(1),
      2,
      Duration::from_millis(1),
    )
    .await
    .unwrap();
    assert!(!healthy);
  }
}
