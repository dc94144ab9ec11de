//! Detached terminal-multiplexer sessions, §4.6: every user process runs
//! inside its own named `tmux` session so it survives independently of
//! any one `exec` call and can be restarted without losing the
//! container's other state.

use command::{ContainerExec, quote_arg};
use pinacle_client::entities::spec::{PodSpec, ProcessSpec};

use crate::{ProcessOpResult, run};

fn kill_session_command(session_name: &str) -> String {
  format!("tmux kill-session -t {} 2>/dev/null || true", quote_arg(session_name))
}

fn new_session_command(session_name: &str, working_dir: &str, start_command: &str) -> String {
  let inner = format!("cd {} && {start_command}", quote_arg(working_dir));
  format!(
    "tmux new-session -d -s {} {}",
    quote_arg(session_name),
    quote_arg(&inner)
  )
}

/// Creates the process's session for the first time. Does not kill any
/// existing session first — provisioning only ever runs once per pod
/// lifetime right after install, when no session should yet exist.
pub async fn provision_process(
  exec: &impl ContainerExec,
  pod_id: &str,
  spec: &PodSpec,
  process: &ProcessSpec,
) -> anyhow::Result<ProcessOpResult> {
  let command_str = new_session_command(
    &process.session_name,
    &spec.working_dir,
    &process.config.start_command.as_shell_command(),
  );
  let log = run(
    exec,
    pod_id,
    &format!("Start Process: {}", process.config.name),
    &spec.working_dir,
    &command_str,
  )
  .await;
  let result = ProcessOpResult { logs: vec![log] };
  if !result.success() {
    anyhow::bail!("failed to start process `{}`", process.config.name);
  }
  Ok(result)
}

/// `startProcess`: always kills any existing session of the same name
/// first — sessions can survive container restarts via persisted
/// volumes, so a stale session must not linger alongside the new one —
/// then recreates it.
pub async fn start_process(
  exec: &impl ContainerExec,
  pod_id: &str,
  spec: &PodSpec,
  process: &ProcessSpec,
) -> anyhow::Result<ProcessOpResult> {
  let kill_log = run(
    exec,
    pod_id,
    &format!("Kill Stale Session: {}", process.config.name),
    &spec.working_dir,
    &kill_session_command(&process.session_name),
  )
  .await;
  let mut result = provision_process(exec, pod_id, spec, process).await?;
  result.logs.insert(0, kill_log);
  Ok(result)
}

/// `stopProcess`: kill the session, best-effort.
pub async fn stop_process(
  exec: &impl ContainerExec,
  pod_id: &str,
  working_dir: &str,
  process: &ProcessSpec,
) -> ProcessOpResult {
  let log = run(
    exec,
    pod_id,
    &format!("Stop Process: {}", process.config.name),
    working_dir,
    &kill_session_command(&process.session_name),
  )
  .await;
  ProcessOpResult { logs: vec![log] }
}

/// `listMultiplexerSessions`: diagnostic helper listing every tmux
/// session currently running in the container.
pub async fn list_multiplexer_sessions(
  exec: &impl ContainerExec,
) -> anyhow::Result<Vec<String>> {
  let output = exec
    .exec_in_pod(&["sh", "-c", "tmux list-sessions -F '#{session_name}' 2>/dev/null || true"])
    .await?;
  Ok(
    output
      .stdout
      .lines()
      .map(str::trim)
      .filter(|l| !l.is_empty())
      .map(str::to_string)
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kill_command_never_fails_the_shell() {
    let command = kill_session_command("process-pod1-web");
    assert!(command.ends_with("|| true"));
  }

  #[test]
  fn new_session_command_cds_into_working_dir() {
    let command = new_session_command("process-pod1-web", "/workspace", "pnpm dev");
    assert!(command.contains("cd /workspace"));
    assert!(command.contains("pnpm dev"));
    assert!(command.contains("process-pod1-web"));
  }
}
