use serde::{Deserialize, Serialize};

use super::MongoId;

/// Closed sum type over the pod's persisted lifecycle state (see DESIGN
/// NOTES, "Sum-type status"). Never crosses a module boundary as a string.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PodStatus {
  #[default]
  Creating,
  Provisioning,
  Running,
  Stopped,
  Error,
  Archived,
}

impl std::fmt::Display for PodStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      PodStatus::Creating => "creating",
      PodStatus::Provisioning => "provisioning",
      PodStatus::Running => "running",
      PodStatus::Stopped => "stopped",
      PodStatus::Error => "error",
      PodStatus::Archived => "archived",
    };
    write!(f, "{s}")
  }
}

/// A single named process the declarative config asks to have running
/// inside the pod, e.g. a dev server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
  pub name: String,
  /// Either a single shell command or an argv-style list; the registry's
  /// expansion joins a list with `&&` the same way `install` does.
  pub start_command: StartCommand,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub health_check: Option<String>,
}

/// Accepts either YAML form (`"pnpm dev"` or `["pnpm", "dev"]`) and
/// normalizes both to a single shell command string via
/// [`crate::parsers::parse_multiline_command`]-compatible joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartCommand {
  Single(String),
  Multiple(Vec<String>),
}

impl StartCommand {
  pub fn as_shell_command(&self) -> String {
    match self {
      StartCommand::Single(s) => s.clone(),
      StartCommand::Multiple(parts) => parts.join(" && "),
    }
  }
}

/// `type: existing | new`, a tagged union per DESIGN NOTES — `new`
/// requires `repository`/`template`, `existing` forbids carrying a
/// template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GithubRepoSetup {
  Existing { repository: String, branch: Option<String> },
  New { repository: String, branch: Option<String> },
}

impl GithubRepoSetup {
  pub fn repository(&self) -> &str {
    match self {
      GithubRepoSetup::Existing { repository, .. }
      | GithubRepoSetup::New { repository, .. } => repository,
    }
  }

  pub fn branch(&self) -> Option<&str> {
    match self {
      GithubRepoSetup::Existing { branch, .. }
      | GithubRepoSetup::New { branch, .. } => branch.as_deref(),
    }
  }

  pub fn is_new(&self) -> bool {
    matches!(self, GithubRepoSetup::New { .. })
  }
}

/// The user-visible, versioned config: `{ version, tier, services[],
/// template?, install?, processes[], tabs[] }`. Serializes with the
/// two-line comment banner and omits empty `processes`/`tabs` arrays, per
/// §6's YAML format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeConfig {
  pub version: String,
  pub tier: String,
  pub services: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub install: Option<StartCommand>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub processes: Vec<ProcessConfig>,
  /// UI hint data, opaque to the core; preserved verbatim through
  /// expansion and round-trip.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tabs: Vec<serde_json::Value>,
}

pub const CONFIG_BANNER: &str =
  "# Generated by pinacle — do not edit while the pod is provisioning\n# https://pinacle.dev/docs/config\n";

impl DeclarativeConfig {
  /// Serializes with the required two-line comment banner prepended.
  pub fn to_yaml(&self) -> Result<String, serde_yaml_ng::Error> {
    let body = serde_yaml_ng::to_string(self)?;
    Ok(format!("{CONFIG_BANNER}{body}"))
  }

  /// Parses YAML, tolerating the banner (or its absence) and both quoted
  /// and unquoted `version`.
  pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml_ng::Error> {
    let mut value: serde_yaml_ng::Value = serde_yaml_ng::from_str(raw)?;
    if let serde_yaml_ng::Value::Mapping(map) = &mut value {
      if let Some(v) = map.get_mut("version") {
        let normalized = match v {
          serde_yaml_ng::Value::String(s) => s.clone(),
          serde_yaml_ng::Value::Number(n) => {
            let s = n.to_string();
            if s.contains('.') { s } else { format!("{s}.0") }
          }
          _ => String::from("1.0"),
        };
        *v = serde_yaml_ng::Value::String(normalized);
      }
    }
    serde_yaml_ng::from_value(value)
  }
}

/// The Pod Record: the persisted input/output of the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(
  feature = "mongo",
  derive(mongo_indexed::derive::MongoIndexed)
)]
pub struct PodRecord {
  #[serde(default, rename = "_id", skip_serializing_if = "String::is_empty")]
  pub id: MongoId,
  #[cfg_attr(feature = "mongo", unique_index)]
  pub slug: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[cfg_attr(feature = "mongo", index)]
  pub owner: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub team: Option<String>,
  /// Serialized declarative config, the source of truth for what the pod
  /// should look like after the next provision.
  pub config: DeclarativeConfig,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub environment_set_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_repository: Option<SourceRepository>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub server_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub container_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub internal_ip: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_url: Option<String>,
  #[serde(default)]
  pub ports: Vec<super::docker::PortMapping>,
  #[cfg_attr(feature = "mongo", index)]
  pub status: PodStatus,
  pub created_at: i64,
  pub updated_at: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_started_at: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_stopped_at: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub archived_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRepository {
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
}

impl PodRecord {
  pub fn public_url(slug: &str, base_domain: &str) -> String {
    format!("https://{slug}.{base_domain}")
  }

  pub fn archive(&mut self) {
    if self.archived_at.is_none() {
      self.archived_at = Some(super::pinacle_timestamp());
    }
  }

  pub fn is_archived(&self) -> bool {
    self.archived_at.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_config() -> DeclarativeConfig {
    DeclarativeConfig {
      version: "1.0".to_string(),
      tier: "dev.small".to_string(),
      services: vec!["web-terminal".to_string()],
      template: None,
      install: None,
      processes: vec![],
      tabs: vec![],
    }
  }

  #[test]
  fn yaml_round_trips_through_banner() {
    let cfg = sample_config();
    let yaml = cfg.to_yaml().unwrap();
    assert!(yaml.starts_with(CONFIG_BANNER));
    let parsed = DeclarativeConfig::from_yaml(&yaml).unwrap();
    assert_eq!(parsed, cfg);
  }

  #[test]
  fn empty_processes_and_tabs_are_omitted_from_yaml() {
    let cfg = sample_config();
    let yaml = cfg.to_yaml().unwrap();
    assert!(!yaml.contains("processes"));
    assert!(!yaml.contains("tabs"));
  }

  #[test]
  fn tagged_repo_setup_carries_new_vs_existing() {
    let new_setup = GithubRepoSetup::New {
      repository: "acme/app".to_string(),
      branch: None,
    };
    assert!(new_setup.is_new());
    assert_eq!(new_setup.repository(), "acme/app");
  }

  #[test]
  fn public_url_matches_slug_and_base_domain() {
    assert_eq!(
      PodRecord::public_url("my-pod", "pinacle.dev"),
      "https://my-pod.pinacle.dev"
    );
  }
}
