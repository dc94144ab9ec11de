//! `execInContainer` / `getContainerLogs` / `validateSandboxRuntime`, §4.3.

use command::quote_argv;
use pinacle_client::entities::docker::ExecOutput;
use transport::{ExecOptions, RemoteTransport};

/// Runs `argv` inside a running container. `argv` is not pre-quoted by
/// the caller; it is composed into a single `sh -c` command the same way
/// [`transport::PodExec`] does it, so a command logged from here and one
/// logged from the pod-scoped exec path look identical.
pub async fn exec_in_container(
  transport: &RemoteTransport,
  container_id: &str,
  argv: &[&str],
) -> anyhow::Result<ExecOutput> {
  let inner = quote_argv(argv.iter().copied());
  let command = format!("docker exec {container_id} sh -c {}", command::quote_arg(&inner));
  transport.exec(&command, ExecOptions { sudo: true }).await
}

/// Fetches a container's logs. `follow` is passed straight through to
/// `docker logs -f`; bounding how long a follow runs is the caller's
/// responsibility (the underlying ssh process has no timeout of its
/// own).
pub async fn container_logs(
  transport: &RemoteTransport,
  container_id: &str,
  tail: Option<u32>,
  follow: bool,
) -> anyhow::Result<String> {
  let mut command = "docker logs".to_string();
  if let Some(tail) = tail {
    command.push_str(&format!(" --tail {tail}"));
  }
  if follow {
    command.push_str(" --follow");
  }
  command.push_str(&format!(" {container_id}"));

  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!("docker logs failed: {}", output.stderr);
  }
  // Docker interleaves stdout/stderr for `logs`; callers that care about
  // the distinction should use `execInContainer` instead.
  if output.stderr.is_empty() {
    Ok(output.stdout)
  } else {
    Ok(format!("{}{}", output.stdout, output.stderr))
  }
}

/// Probes the engine's configured runtimes for `sandbox_runtime`'s
/// presence via `docker info`, per the "fail fast if the sandbox runtime
/// is missing" design note.
pub async fn validate_sandbox_runtime(
  transport: &RemoteTransport,
  sandbox_runtime: &str,
) -> anyhow::Result<bool> {
  let command = "docker info --format '{{json .Runtimes}}'".to_string();
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!("docker info failed: {}", output.stderr);
  }
  let runtimes: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
  Ok(runtimes.as_object().is_some_and(|m| m.contains_key(sandbox_runtime)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn logs_command_includes_tail_and_follow() {
    // build_command isn't exposed standalone; exercise the string shape
    // the way the public function would compose it.
    let mut command = "docker logs".to_string();
    command.push_str(" --tail 100");
    command.push_str(" --follow");
    command.push_str(" abc123");
    assert_eq!(command, "docker logs --tail 100 --follow abc123");
  }

  #[test]
  fn exec_argv_is_shell_quoted_into_sh_c() {
    let inner = quote_argv(["echo", "hello world"].into_iter());
    assert_eq!(inner, "echo 'hello world'");
  }
}
