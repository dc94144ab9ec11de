//! `runInstall`, §4.6.

use command::ContainerExec;
use pinacle_client::entities::spec::PodSpec;

use crate::{ProcessOpResult, run};

/// Runs `spec.installCommand` in the pod's working directory. For
/// existing repos a failure is logged and swallowed (the repo is assumed
/// to already be in a working state); for new repos it is fatal, since
/// there is nothing else to fall back to.
pub async fn run_install(
  exec: &impl ContainerExec,
  pod_id: &str,
  spec: &PodSpec,
  is_existing_repo: bool,
) -> anyhow::Result<ProcessOpResult> {
  let Some(install_command) = &spec.install_command else {
    return Ok(ProcessOpResult::default());
  };
  let command_str = install_command.as_shell_command();
  let log = run(exec, pod_id, "Install", &spec.working_dir, &command_str).await;
  let result = ProcessOpResult { logs: vec![log] };

  if result.success() || is_existing_repo {
    Ok(result)
  } else {
    anyhow::bail!("install command failed for new repo pod {pod_id}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::docker::ExecOutput;
  use pinacle_client::entities::pod::StartCommand;
  use pinacle_client::entities::spec::{NetworkSpec, ProcessSpec, ResourceSpec};
  use std::collections::HashMap;

  struct FailingExec;
  impl ContainerExec for FailingExec {
    async fn exec_in_pod(&self, _argv: &[&str]) -> anyhow::Result<ExecOutput> {
      Ok(ExecOutput { stdout: String::new(), stderr: "boom".to_string(), exit_code: 1 })
    }
  }

  fn spec_with_install(install: StartCommand) -> PodSpec {
    PodSpec {
      id: "pod1".to_string(),
      name: "app".to_string(),
      slug: "app".to_string(),
      base_image: "pinacle/base:latest".to_string(),
      template: None,
      resources: ResourceSpec { cpu_cores: 1.0, memory_mb: 1024, storage_mb: 10240 },
      network: NetworkSpec::default(),
      services: vec![],
      install_command: Some(install),
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
  async fn existing_repo_install_failure_is_swallowed() {
    let exec = FailingExec;
    let spec = spec_with_install(StartCommand::Single("pnpm i".to_string()));
    let result = run_install(&exec, "pod1", &spec, true).await.unwrap();
    assert!(!result.success());
  }

  #[tokio::test]
  async fn new_repo_install_failure_is_fatal() {
    let exec = FailingExec;
    let spec = spec_with_install(StartCommand::Single("pnpm i".to_string()));
    assert!(run_install(&exec, "pod1", &spec, false).await.is_err());
  }

  #[tokio::test]
  async fn no_install_command_is_a_no_op() {
    let exec = FailingExec;
    let mut spec = spec_with_install(StartCommand::Single("pnpm i".to_string()));
    spec.install_command = None;
    let result = run_install(&exec, "pod1", &spec, false).await.unwrap();
    assert!(result.logs.is_empty());
  }
}
