//! Per-pod bridge network creation, §4.4.

use std::collections::HashSet;

use pinacle_client::entities::docker::network_name;
use transport::{ExecOptions, RemoteTransport};

use crate::subnet::{AllocatedSubnet, allocate_subnet};

/// Lists the CIDRs of bridge networks the engine already knows about, so
/// the subnet allocator never hands out a range already in use.
pub async fn existing_bridge_subnets(
  transport: &RemoteTransport,
) -> anyhow::Result<HashSet<String>> {
  let list_command =
    "docker network ls --driver bridge --format '{{.ID}}'".to_string();
  let output = transport.exec(&list_command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!("docker network ls failed: {}", output.stderr);
  }

  let mut subnets = HashSet::new();
  for id in output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
    let inspect_command =
      format!("docker network inspect {id} --format '{{{{range .IPAM.Config}}}}{{{{.Subnet}}}} {{{{end}}}}'");
    let inspect_output =
      transport.exec(&inspect_command, ExecOptions { sudo: true }).await?;
    if !inspect_output.success() {
      continue;
    }
    for cidr in inspect_output.stdout.split_whitespace() {
      subnets.insert(cidr.to_string());
    }
  }
  Ok(subnets)
}

/// Creates the pod's bridge network, destroying any stale network of the
/// same name first (idempotent create, per §4.4).
pub async fn create_pod_network(
  transport: &RemoteTransport,
  pod_id: &str,
) -> anyhow::Result<AllocatedSubnet> {
  let name = network_name(pod_id);
  destroy_pod_network(transport, pod_id).await?;

  let existing = existing_bridge_subnets(transport).await?;
  let subnet = allocate_subnet(pod_id, &existing)
    .map_err(|e| anyhow::anyhow!(e))?;

  let bridge_name = format!("br-{}", &pod_id.chars().take(12).collect::<String>());
  let command = format!(
    "docker network create --driver bridge --subnet {} --gateway {} --opt com.docker.network.bridge.name={bridge_name} {name}",
    subnet.cidr, subnet.gateway_ip
  );
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!("docker network create failed: {}", output.stderr);
  }
  Ok(subnet)
}

/// Destroys the pod's bridge network. "Already gone" is not an error.
pub async fn destroy_pod_network(
  transport: &RemoteTransport,
  pod_id: &str,
) -> anyhow::Result<()> {
  let name = network_name(pod_id);
  let command = format!("docker network rm {name}");
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if output.success() {
    return Ok(());
  }
  let lower = output.stderr.to_lowercase();
  if lower.contains("not found") || lower.contains("no such network") {
    return Ok(());
  }
  anyhow::bail!("docker network rm failed: {}", output.stderr)
}

/// Attaches an already-created container to the pod's network. Used when
/// the container was created with `--network bridge` and the per-pod
/// network is wired up after the fact, per the note in §4.3.
pub async fn connect_container(
  transport: &RemoteTransport,
  pod_id: &str,
  container_id: &str,
  pod_ip: &str,
) -> anyhow::Result<()> {
  let name = network_name(pod_id);
  let command = format!("docker network connect --ip {pod_ip} {name} {container_id}");
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!("docker network connect failed: {}", output.stderr);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bridge_interface_name_is_truncated_to_twelve_chars() {
    let pod_id = "abcdefghijklmnopqrstuvwxyz";
    let bridge_name = format!("br-{}", &pod_id.chars().take(12).collect::<String>());
    assert_eq!(bridge_name, "br-abcdefghijkl");
  }
}
