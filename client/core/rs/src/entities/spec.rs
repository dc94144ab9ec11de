use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::docker::PortMapping;
use super::pod::{
  DeclarativeConfig, GithubRepoSetup, ProcessConfig, StartCommand,
};

/// `resources { cpuCores, memoryMb, storageMb }`, copied out of the tier
/// table at expansion time so the spec is self-contained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
  pub cpu_cores: f64,
  pub memory_mb: u64,
  pub storage_mb: u64,
}

impl ResourceSpec {
  /// `--cpu-quota` for a 100ms `--cpu-period`, per the container create
  /// translation rule in the runtime driver.
  pub fn cpu_quota(&self, period_us: u64) -> u64 {
    (self.cpu_cores * period_us as f64).floor() as u64
  }

  pub fn memory_limit_mib(&self) -> u64 {
    self.memory_mb
  }
}

/// `network { ports[], subnet?, podIp?, gatewayIp?, allowEgress,
/// allowedDomains?, bandwidthLimitMbps? }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
  #[serde(default)]
  pub ports: Vec<PortMapping>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subnet: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pod_ip: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gateway_ip: Option<String>,
  #[serde(default = "default_allow_egress")]
  pub allow_egress: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub allowed_domains: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bandwidth_limit_mbps: Option<u32>,
}

fn default_allow_egress() -> bool {
  true
}

/// `services[]` expanded from registry ids to `{ name, ports[],
/// environment{}, autoRestart, dependsOn[] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
  pub name: String,
  #[serde(default)]
  pub ports: Vec<PortMapping>,
  #[serde(default)]
  pub environment: HashMap<String, String>,
  #[serde(default = "default_auto_restart")]
  pub auto_restart: bool,
  #[serde(default)]
  pub depends_on: Vec<String>,
}

fn default_auto_restart() -> bool {
  true
}

/// Runtime-expanded process entry, carrying the generated terminal-session
/// name the process provisioner uses so it is deterministic across
/// restarts without recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
  #[serde(flatten)]
  pub config: ProcessConfig,
  pub session_name: String,
}

impl ProcessSpec {
  pub fn session_name_for(pod_id: &str, process_name: &str) -> String {
    format!("process-{pod_id}-{process_name}")
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshKeyPair {
  pub public: String,
  pub private: String,
  pub fingerprint: String,
}

/// Runtime-expanded form of [`GithubRepoSetup`][super::pod::GithubRepoSetup],
/// carrying the generated key pair and, once registered, the GitHub deploy
/// key id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRepoSetup {
  #[serde(flatten)]
  pub declared: GithubRepoSetup,
  pub ssh_key_pair: SshKeyPair,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deploy_key_id: Option<i64>,
}

/// Pod Spec: the runtime expansion of [`DeclarativeConfig`], a superset
/// carrying everything the managers need to actually drive the host. The
/// expansion function producing this must be total and deterministic given
/// `(DeclarativeConfig, runtime inputs)`; see `registry::expand_spec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
  pub id: String,
  pub name: String,
  pub slug: String,
  pub base_image: String,
  /// The template id that produced `base_image`, if any; carried
  /// through untouched so round-trip conversion back to
  /// [`DeclarativeConfig`] loses nothing, even though nothing downstream
  /// of expansion re-reads it (the base image and init script it
  /// produced are already baked into the spec).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template: Option<String>,
  pub resources: ResourceSpec,
  pub network: NetworkSpec,
  pub services: Vec<ServiceSpec>,
  /// Preserves the declarative config's original `String` vs `Vec<String>`
  /// shape so `to_declarative_config` round-trips byte-for-byte; only
  /// [`StartCommand::as_shell_command`] callers care about the joined
  /// form.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub install_command: Option<StartCommand>,
  #[serde(default)]
  pub processes: Vec<ProcessSpec>,
  #[serde(default)]
  pub environment: HashMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub github_repo: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub github_branch: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub github_repo_setup: Option<RuntimeRepoSetup>,
  pub working_dir: String,
  pub user: String,
  /// Carried through untouched from the declarative config so round-trip
  /// conversion back loses nothing.
  #[serde(default)]
  pub tabs: Vec<serde_json::Value>,
  pub tier: String,
}

impl PodSpec {
  pub const DEFAULT_WORKING_DIR: &'static str = "/workspace";
  pub const DEFAULT_USER: &'static str = "root";

  /// `toConfig(expand(cfg, r)) == cfg` on all declarative fields: the
  /// inverse of spec expansion, used both by the round-trip test and by
  /// the orchestrator to persist the mutated spec back as config (step 8
  /// of the provisioning sequence).
  pub fn to_declarative_config(&self) -> DeclarativeConfig {
    DeclarativeConfig {
      version: "1.0".to_string(),
      tier: self.tier.clone(),
      services: self.services.iter().map(|s| s.name.clone()).collect(),
      template: self.template.clone(),
      install: self.install_command.clone(),
      processes: self.processes.iter().map(|p| p.config.clone()).collect(),
      tabs: self.tabs.clone(),
    }
  }

  pub fn is_existing_repo(&self) -> bool {
    matches!(
      self.github_repo_setup,
      Some(RuntimeRepoSetup {
        declared: GithubRepoSetup::Existing { .. },
        ..
      })
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_spec() -> PodSpec {
    PodSpec {
      id: "pod1".to_string(),
      name: "my app".to_string(),
      slug: "my-app".to_string(),
      base_image: "pinacle/base:latest".to_string(),
      template: None,
      resources: ResourceSpec { cpu_cores: 1.0, memory_mb: 1024, storage_mb: 10240 },
      network: NetworkSpec::default(),
      services: vec![ServiceSpec {
        name: "web-terminal".to_string(),
        ports: vec![],
        environment: HashMap::new(),
        auto_restart: true,
        depends_on: vec![],
      }],
      install_command: None,
      processes: vec![],
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

  #[test]
  fn round_trips_to_declarative_config() {
    let spec = sample_spec();
    let cfg = spec.to_declarative_config();
    assert_eq!(cfg.tier, "dev.small");
    assert_eq!(cfg.services, vec!["web-terminal".to_string()]);
    assert!(cfg.install.is_none());
    assert!(cfg.processes.is_empty());
  }

  #[test]
  fn round_trip_preserves_template_and_install_array_shape() {
    let mut spec = sample_spec();
    spec.template = Some("vite".to_string());
    spec.install_command =
      Some(StartCommand::Multiple(vec!["pnpm i".into(), "pnpm build".into()]));
    let cfg = spec.to_declarative_config();
    assert_eq!(cfg.template.as_deref(), Some("vite"));
    assert_eq!(
      cfg.install,
      Some(StartCommand::Multiple(vec!["pnpm i".into(), "pnpm build".into()]))
    );
  }

  #[test]
  fn cpu_quota_floors_fractional_cores() {
    let resources = ResourceSpec { cpu_cores: 1.5, memory_mb: 1024, storage_mb: 1024 };
    assert_eq!(resources.cpu_quota(100_000), 150_000);
  }

  #[test]
  fn session_name_follows_naming_convention() {
    assert_eq!(
      ProcessSpec::session_name_for("pod1", "app"),
      "process-pod1-app"
    );
  }
}
