//! Network policy application, §4.4: egress, ingress, and bandwidth
//! limits translate to host firewall/traffic-control rules scoped to the
//! pod's bridge interface. Unsupported or already-applied rules degrade
//! to a warning, never a fatal error — provisioning must not fail
//! because `tc` is missing or a rule already exists.

use pinacle_client::entities::spec::NetworkSpec;
use transport::{ExecOptions, RemoteTransport};

fn bridge_interface(pod_id: &str) -> String {
  format!("br-{}", &pod_id.chars().take(12).collect::<String>())
}

/// Applies every configured policy for a pod's network, logging a
/// warning (not failing) for anything the host doesn't support.
pub async fn apply_network_policy(
  transport: &RemoteTransport,
  pod_id: &str,
  network: &NetworkSpec,
) -> anyhow::Result<()> {
  let interface = bridge_interface(pod_id);

  if !network.allow_egress {
    apply_egress_block(transport, &interface).await;
  }
  if let Some(domains) = &network.allowed_domains {
    apply_egress_allowlist(transport, &interface, domains).await;
  }
  if let Some(limit_mbps) = network.bandwidth_limit_mbps {
    apply_bandwidth_limit(transport, &interface, limit_mbps).await;
  }
  Ok(())
}

async fn apply_egress_block(transport: &RemoteTransport, interface: &str) {
  let command =
    format!("iptables -I FORWARD -i {interface} -j DROP");
  run_best_effort(transport, &command, "egress block").await;
}

async fn apply_egress_allowlist(
  transport: &RemoteTransport,
  interface: &str,
  domains: &[String],
) {
  for domain in domains {
    let command = format!(
      "iptables -I FORWARD -i {interface} -d {domain} -j ACCEPT"
    );
    run_best_effort(transport, &command, "egress allowlist entry").await;
  }
}

async fn apply_bandwidth_limit(
  transport: &RemoteTransport,
  interface: &str,
  limit_mbps: u32,
) {
  let command = format!(
    "tc qdisc add dev {interface} root tbf rate {limit_mbps}mbit burst 32kbit latency 400ms"
  );
  run_best_effort(transport, &command, "bandwidth limit").await;
}

async fn run_best_effort(transport: &RemoteTransport, command: &str, what: &str) {
  match transport.exec(command, ExecOptions { sudo: true }).await {
    Ok(output) if output.success() => {}
    Ok(output) => {
      tracing::warn!(what, stderr = %output.stderr, "network policy rule did not apply");
    }
    Err(err) => {
      tracing::warn!(what, error = %err, "network policy rule failed to run");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bridge_interface_matches_network_manager_naming() {
    assert_eq!(bridge_interface("pod1"), "br-pod1");
  }
}
