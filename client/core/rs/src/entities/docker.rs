use serde::{Deserialize, Serialize};

/// Observed container state, as reported by `docker inspect`. The canonical
/// mapping from the engine's own status strings lives in the container
/// runtime driver, since it is the only place that talks to `docker`.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
  Created,
  Running,
  Paused,
  Restarting,
  Exited,
  Removing,
  Dead,
  #[default]
  Unknown,
}

impl ContainerStatus {
  pub fn is_running(&self) -> bool {
    matches!(self, ContainerStatus::Running)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
  Tcp,
  Udp,
}

impl Default for PortProtocol {
  fn default() -> Self {
    PortProtocol::Tcp
  }
}

impl std::fmt::Display for PortProtocol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PortProtocol::Tcp => write!(f, "tcp"),
      PortProtocol::Udp => write!(f, "udp"),
    }
  }
}

/// A single port mapping. For the core, only one of these (`name:
/// "nginx-proxy"`, `internal: 80`) is ever exposed externally per pod; all
/// other entries carry no `external` and live only on the pod's internal
/// bridge network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortMapping {
  pub name: String,
  pub internal: u16,
  #[serde(default)]
  pub external: Option<u16>,
  #[serde(default)]
  pub protocol: PortProtocol,
  #[serde(default)]
  pub public: bool,
  #[serde(default)]
  pub subdomain: Option<String>,
}

impl PortMapping {
  pub fn reverse_proxy(external: u16) -> Self {
    Self {
      name: "nginx-proxy".to_string(),
      internal: 80,
      external: Some(external),
      protocol: PortProtocol::Tcp,
      public: true,
      subdomain: None,
    }
  }
}

/// Observed container state, the return type of `getContainer` /
/// `listContainers`. `name` is always `pinacle-pod-{podId}` — the
/// authoritative back-pointer from container to pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
  pub id: String,
  pub name: String,
  pub status: ContainerStatus,
  pub pod_id: String,
  pub internal_ip: Option<String>,
  #[serde(default)]
  pub ports: Vec<PortMapping>,
  pub created_at: i64,
  pub started_at: Option<i64>,
  pub stopped_at: Option<i64>,
}

/// Result of `execInContainer`. A non-zero `exit_code` is surfaced through
/// the transport error path by the caller, not by this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_code: i32,
}

impl ExecOutput {
  pub fn success(&self) -> bool {
    self.exit_code == 0
  }
}

/// The fixed set of named volumes mounted at every pod's well-known
/// directories, giving pods VM-like persistence across container
/// recreation. `/tmp`, `/proc`, `/sys`, `/dev`, `/run` are deliberately not
/// in this list.
pub const UNIVERSAL_VOLUME_ROLES: &[(&str, &str)] = &[
  ("workspace", "/workspace"),
  ("home", "/home"),
  ("root", "/root"),
  ("etc", "/etc"),
  ("usr-local", "/usr/local"),
  ("opt", "/opt"),
  ("var", "/var"),
  ("srv", "/srv"),
];

pub fn container_name(pod_id: &str) -> String {
  format!("pinacle-pod-{pod_id}")
}

pub fn volume_name(pod_id: &str, role: &str) -> String {
  format!("pinacle-vol-{pod_id}-{role}")
}

pub fn network_name(pod_id: &str) -> String {
  format!("pinacle-net-{pod_id}")
}

/// Recovers a pod id from a container name using the authoritative naming
/// convention. Returns `None` for anything not matching
/// `^pinacle-pod-(.+)$`.
pub fn pod_id_from_container_name(name: &str) -> Option<&str> {
  name.strip_prefix("pinacle-pod-").filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recovers_pod_id_from_container_name() {
    assert_eq!(
      pod_id_from_container_name("pinacle-pod-abc123"),
      Some("abc123")
    );
    assert_eq!(pod_id_from_container_name("other-name"), None);
    assert_eq!(pod_id_from_container_name("pinacle-pod-"), None);
  }

  #[test]
  fn naming_conventions_are_stable() {
    assert_eq!(container_name("abc"), "pinacle-pod-abc");
    assert_eq!(volume_name("abc", "workspace"), "pinacle-vol-abc-workspace");
    assert_eq!(network_name("abc"), "pinacle-net-abc");
  }
}
