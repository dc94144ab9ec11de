//! `startContainer` / `stopContainer` / `removeContainer`, §4.3.

use pinacle_client::entities::docker::{ContainerStatus, pod_id_from_container_name};
use transport::{ExecOptions, RemoteTransport};

use crate::inspect::inspect_container;

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
  pub remove_volumes: bool,
}

/// Starts a container and requires it to reach `running` within a short
/// grace period. The engine's own `start` returns immediately; a
/// container that crashes on entry (bad entrypoint, missing image) would
/// otherwise be reported as "started" when it is actually `exited`.
pub async fn start_container(
  transport: &RemoteTransport,
  container_id: &str,
) -> anyhow::Result<()> {
  let command = format!("docker start {container_id}");
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!("docker start failed: {}", output.stderr);
  }

  tokio::time::sleep(std::time::Duration::from_secs(2)).await;

  match inspect_container(transport, container_id).await? {
    Some(info) if info.status == ContainerStatus::Running => Ok(()),
    Some(info) => {
      anyhow::bail!("container {container_id} did not reach running (status: {:?})", info.status)
    }
    None => anyhow::bail!("container {container_id} vanished after start"),
  }
}

/// Stops a container. A container that is already gone is not an error —
/// the caller almost always wants "make sure it's stopped", not "prove it
/// was running".
pub async fn stop_container(
  transport: &RemoteTransport,
  container_id: &str,
) -> anyhow::Result<()> {
  let command = format!("docker stop {container_id}");
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if output.success() || is_already_gone(&output.stderr) {
    return Ok(());
  }
  anyhow::bail!("docker stop failed: {}", output.stderr)
}

/// Removes a container, optionally also its universal volumes (pod
/// deletion, never pod recreation — recreation deliberately keeps
/// volumes around, per §3).
pub async fn remove_container(
  transport: &RemoteTransport,
  container_id: &str,
  opts: RemoveOptions,
) -> anyhow::Result<()> {
  let _ = stop_container(transport, container_id).await;

  let command = format!("docker rm -f {container_id}");
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() && !is_already_gone(&output.stderr) {
    anyhow::bail!("docker rm failed: {}", output.stderr);
  }

  if opts.remove_volumes {
    if let Some(pod_id) = pod_id_from_container_name(container_id) {
      remove_pod_volumes(transport, pod_id).await?;
    }
  }

  Ok(())
}

async fn remove_pod_volumes(
  transport: &RemoteTransport,
  pod_id: &str,
) -> anyhow::Result<()> {
  let list_command = format!("docker volume ls -q --filter name=pinacle-vol-{pod_id}-");
  let output = transport.exec(&list_command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!("docker volume ls failed: {}", output.stderr);
  }
  for volume in output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
    let rm_command = format!("docker volume rm {volume}");
    // Best-effort: a volume busy with a lingering mount shouldn't block
    // the rest of teardown.
    let _ = transport.exec(&rm_command, ExecOptions { sudo: true }).await;
  }
  Ok(())
}

fn is_already_gone(stderr: &str) -> bool {
  let lower = stderr.to_lowercase();
  lower.contains("no such container") || lower.contains("is not running")
}
