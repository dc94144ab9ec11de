//! `getContainer` / `listContainers`, §4.3: inspects the engine and maps
//! its own status vocabulary and port-binding JSON into the domain
//! shapes from `pinacle_client::entities::docker`.

use pinacle_client::entities::docker::{
  ContainerInfo, ContainerStatus, PortMapping, PortProtocol,
  pod_id_from_container_name,
};
use transport::{ExecOptions, RemoteTransport};

/// `getContainer(id) -> ContainerInfo | null`. Absence — the engine
/// returning a nonzero exit from `inspect` — maps to `Ok(None)`, not an
/// error, per §4.3.
pub async fn inspect_container(
  transport: &RemoteTransport,
  id_or_name: &str,
) -> anyhow::Result<Option<ContainerInfo>> {
  let command = format!("docker inspect {id_or_name}");
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    return Ok(None);
  }
  let parsed: Vec<serde_json::Value> = serde_json::from_str(&output.stdout)?;
  let Some(raw) = parsed.into_iter().next() else {
    return Ok(None);
  };
  Ok(Some(container_info_from_json(&raw)?))
}

/// `listContainers(filters?) -> ContainerInfo[]`: `ps -a` restricted to
/// pinacle-managed containers (optionally further filtered by
/// `name_filter`), then inspected one by one.
pub async fn list_containers(
  transport: &RemoteTransport,
  name_filter: Option<&str>,
) -> anyhow::Result<Vec<ContainerInfo>> {
  let filter = name_filter.unwrap_or("pinacle-pod-");
  let command =
    format!("docker ps -a --filter name={filter} --format '{{{{.Names}}}}'");
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!("docker ps failed: {}", output.stderr);
  }
  let mut containers = Vec::new();
  for name in output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
    if let Some(info) = inspect_container(transport, name).await? {
      containers.push(info);
    }
  }
  Ok(containers)
}

fn container_info_from_json(
  raw: &serde_json::Value,
) -> anyhow::Result<ContainerInfo> {
  let id = raw["Id"].as_str().unwrap_or_default().to_string();
  let name =
    raw["Name"].as_str().unwrap_or_default().trim_start_matches('/').to_string();
  let pod_id = pod_id_from_container_name(&name)
    .map(str::to_string)
    .unwrap_or_default();
  let status = map_status(raw["State"]["Status"].as_str().unwrap_or(""));
  let internal_ip = raw["NetworkSettings"]["IPAddress"]
    .as_str()
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .or_else(|| first_network_ip(raw));
  let created_at = parse_docker_time(raw["Created"].as_str());
  let started_at = parse_docker_time(raw["State"]["StartedAt"].as_str())
    .filter(|&t| t > 0);
  let stopped_at = parse_docker_time(raw["State"]["FinishedAt"].as_str())
    .filter(|&t| t > 0);
  let ports = parse_port_bindings(&raw["NetworkSettings"]["Ports"]);

  Ok(ContainerInfo {
    id,
    name,
    status,
    pod_id,
    internal_ip,
    ports,
    created_at: created_at.unwrap_or_default(),
    started_at,
    stopped_at,
  })
}

fn first_network_ip(raw: &serde_json::Value) -> Option<String> {
  raw["NetworkSettings"]["Networks"]
    .as_object()?
    .values()
    .find_map(|net| net["IPAddress"].as_str())
    .filter(|s| !s.is_empty())
    .map(str::to_string)
}

fn map_status(raw: &str) -> ContainerStatus {
  match raw {
    "created" => ContainerStatus::Created,
    "running" => ContainerStatus::Running,
    "paused" => ContainerStatus::Paused,
    "restarting" => ContainerStatus::Restarting,
    "exited" => ContainerStatus::Exited,
    "removing" => ContainerStatus::Removing,
    "dead" => ContainerStatus::Dead,
    _ => ContainerStatus::Unknown,
  }
}

fn parse_docker_time(raw: Option<&str>) -> Option<i64> {
  let raw = raw?;
  // RFC3339 with nanoseconds, e.g. `2024-01-01T00:00:00.123456789Z`.
  chrono::DateTime::parse_from_rfc3339(raw)
    .ok()
    .map(|t| t.timestamp_millis())
}

fn parse_port_bindings(raw: &serde_json::Value) -> Vec<PortMapping> {
  let Some(obj) = raw.as_object() else {
    return Vec::new();
  };
  let mut ports = Vec::new();
  for (key, bindings) in obj {
    let Some((internal_str, proto)) = key.split_once('/') else {
      continue;
    };
    let Ok(internal) = internal_str.parse::<u16>() else {
      continue;
    };
    let protocol = if proto == "udp" { PortProtocol::Udp } else { PortProtocol::Tcp };
    let external = bindings
      .as_array()
      .and_then(|arr| arr.first())
      .and_then(|b| b["HostPort"].as_str())
      .and_then(|p| p.parse::<u16>().ok());
    ports.push(PortMapping {
      name: format!("port-{internal}"),
      internal,
      external,
      protocol,
      public: external.is_some(),
      subdomain: None,
    });
  }
  ports
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn maps_known_engine_statuses() {
    assert_eq!(map_status("running"), ContainerStatus::Running);
    assert_eq!(map_status("exited"), ContainerStatus::Exited);
    assert_eq!(map_status("weird"), ContainerStatus::Unknown);
  }

  #[test]
  fn parses_port_bindings_with_external_mapping() {
    let raw = serde_json::json!({
      "80/tcp": [{"HostIp": "0.0.0.0", "HostPort": "30001"}],
      "5000/tcp": null,
    });
    let ports = parse_port_bindings(&raw);
    let proxy = ports.iter().find(|p| p.internal == 80).unwrap();
    assert_eq!(proxy.external, Some(30001));
    let internal_only = ports.iter().find(|p| p.internal == 5000).unwrap();
    assert_eq!(internal_only.external, None);
  }

  #[test]
  fn extracts_pod_id_from_container_name() {
    let raw = serde_json::json!({
      "Id": "abc",
      "Name": "/pinacle-pod-my-pod",
      "State": {"Status": "running", "StartedAt": "2024-01-01T00:00:00Z", "FinishedAt": "0001-01-01T00:00:00Z"},
      "Created": "2024-01-01T00:00:00Z",
      "NetworkSettings": {"IPAddress": "10.100.1.2", "Ports": {}},
    });
    let info = container_info_from_json(&raw).unwrap();
    assert_eq!(info.pod_id, "my-pod");
    assert_eq!(info.status, ContainerStatus::Running);
    assert_eq!(info.internal_ip.as_deref(), Some("10.100.1.2"));
  }
}
