use chrono::Utc;

/// Subtypes of [PodRecord][pod::PodRecord] and the declarative config it wraps.
pub mod pod;
/// The runtime expansion of a declarative config: [PodSpec][spec::PodSpec].
pub mod spec;
/// Observed container / network / port state: [ContainerInfo][docker::ContainerInfo].
pub mod docker;
/// [ServerRecord][server::ServerRecord], the assigned-host record.
pub mod server;
/// [DotenvRecord][dotenv::DotenvRecord], the persisted environment set.
pub mod dotenv;
/// The persisted [PodLogRecord][log::PodLogRecord] (Command Log).
pub mod log;
/// Core config and its environment-variable overrides.
pub mod config;
/// Subtypes of [LogConfig][logger::LogConfig].
pub mod logger;
/// Tier / service / template registry shapes (the tables themselves live in
/// the `registry` crate, which depends on this one).
pub mod registry;
/// In-process lifecycle events emitted by the pod manager.
pub mod event;
/// The closed error taxonomy from the error-handling design (see DESIGN.md).
pub mod error;

#[cfg(feature = "mongo")]
pub type MongoId = String;
#[cfg(not(feature = "mongo"))]
pub type MongoId = String;

/// Milliseconds since epoch, matching the timestamp convention used
/// throughout the persisted records.
pub fn pinacle_timestamp() -> i64 {
  Utc::now().timestamp_millis()
}

/// Enforces the docker naming rules that apply to container, network, and
/// volume names derived from a pod id: lowercase, `[a-z0-9_.-]` only.
pub fn to_docker_compatible_name(name: &str) -> String {
  name
    .trim()
    .to_lowercase()
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
      c
    } else {
      '-'
    })
    .collect()
}

/// DNS-safe slug derivation: lowercase, hyphen-separated, no leading/trailing
/// hyphens, used to build the pod's public URL host label.
pub fn to_slug(name: &str) -> String {
  let mut slug = String::with_capacity(name.len());
  let mut last_was_dash = true;
  for c in name.trim().to_lowercase().chars() {
    if c.is_ascii_alphanumeric() {
      slug.push(c);
      last_was_dash = false;
    } else if !last_was_dash {
      slug.push('-');
      last_was_dash = true;
    }
  }
  while slug.ends_with('-') {
    slug.pop();
  }
  if slug.is_empty() {
    slug.push_str("pod");
  }
  slug
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slug_is_dns_safe() {
    assert_eq!(to_slug("My Cool App!!"), "my-cool-app");
    assert_eq!(to_slug("  leading/trailing  "), "leading-trailing");
    assert_eq!(to_slug("___"), "pod");
  }

  #[test]
  fn docker_name_keeps_only_allowed_chars() {
    assert_eq!(to_docker_compatible_name("Pod Name!"), "pod-name-");
  }
}
