//! Spec expansion, §4.1 step 5 / §3's "Pod Spec (runtime expansion)":
//! turns a [`DeclarativeConfig`] plus the runtime inputs the orchestrator
//! gathers (generated id/slug, resolved env-set, a generated repo-setup
//! key pair) into a [`PodSpec`]. Total and deterministic: every error
//! path is a [`CoreError::ConfigInvalid`], never a panic, and the same
//! inputs always produce the same spec (no randomness, no clock reads).

use std::collections::HashMap;

use pinacle_client::entities::docker::PortMapping;
use pinacle_client::entities::error::CoreError;
use pinacle_client::entities::pod::{DeclarativeConfig, GithubRepoSetup};
use pinacle_client::entities::spec::{
  NetworkSpec, PodSpec, ProcessSpec, ResourceSpec, RuntimeRepoSetup,
  ServiceSpec, SshKeyPair,
};

use crate::{services, templates, tiers};

/// Runtime inputs the orchestrator supplies alongside the declarative
/// config — everything expansion needs that isn't in the config itself.
#[derive(Debug, Clone, Default)]
pub struct ExpansionInputs {
  pub id: String,
  pub name: String,
  pub slug: String,
  /// Resolved env-set variables (from the referenced
  /// [`pinacle_client::entities::dotenv::DotenvRecord`]), already
  /// flattened to `KEY=value` pairs. Overrides a template's
  /// `default_env` per §3's "template defaults ⊕ env-set".
  pub env_set: HashMap<String, String>,
  /// Present iff the declarative config's (out-of-band) repo setup
  /// request carried a generated SSH key pair; `None` means the pod has
  /// no repository.
  pub github_repo_setup: Option<(GithubRepoSetup, SshKeyPair)>,
}

/// Expands `cfg` into a [`PodSpec`]. Fails with
/// [`CoreError::ConfigInvalid`] if the tier, any service id, or the
/// template is unknown, or if `githubRepoSetup.type == "new"` without a
/// template (the tagged-union constraint from DESIGN NOTES).
pub fn expand_spec(
  cfg: &DeclarativeConfig,
  inputs: ExpansionInputs,
) -> Result<PodSpec, CoreError> {
  let tier = tiers::tier(&cfg.tier).ok_or_else(|| {
    CoreError::ConfigInvalid(format!("unknown tier `{}`", cfg.tier))
  })?;
  let resources = ResourceSpec {
    cpu_cores: tier.cpu_cores,
    memory_mb: tier.memory_mb,
    storage_mb: tier.storage_mb,
  };

  let template = cfg
    .template
    .as_ref()
    .map(|id| {
      templates::template(id).ok_or_else(|| {
        CoreError::ConfigInvalid(format!("unknown template `{id}`"))
      })
    })
    .transpose()?;

  if let Some((setup, _)) = &inputs.github_repo_setup
    && setup.is_new()
    && template.is_none()
  {
    return Err(CoreError::ConfigInvalid(
      "githubRepoSetup.type = \"new\" requires a template".to_string(),
    ));
  }

  let base_image = template
    .as_ref()
    .map(|t| t.base_image.clone())
    .unwrap_or_else(|| templates::default_base_image().to_string());

  let mut environment = template
    .as_ref()
    .map(|t| t.default_env.clone())
    .unwrap_or_default();
  environment.extend(inputs.env_set);

  let mut services = Vec::with_capacity(cfg.services.len());
  for service_id in &cfg.services {
    let entry = services::entry(service_id).ok_or_else(|| {
      CoreError::ConfigInvalid(format!("unknown service `{service_id}`"))
    })?;
    let ports = entry
      .definition
      .default_port
      .map(|port| {
        vec![PortMapping {
          name: service_id.clone(),
          internal: port,
          external: None,
          protocol: Default::default(),
          public: false,
          // §6: internal-only ports are reached by hostname, not an
          // external mapping — the subdomain encodes the internal port
          // and pod slug for the in-container reverse proxy to route on.
          subdomain: Some(format!("localhost-{port}-pod-{}", inputs.slug)),
        }]
      })
      .unwrap_or_default();
    services.push(ServiceSpec {
      name: service_id.clone(),
      ports,
      environment: entry.definition.default_env.clone(),
      auto_restart: true,
      depends_on: entry.definition.depends_on.clone(),
    });
  }

  let processes = cfg
    .processes
    .iter()
    .map(|process| ProcessSpec {
      session_name: ProcessSpec::session_name_for(&inputs.id, &process.name),
      config: process.clone(),
    })
    .collect();

  let (github_repo, github_branch, github_repo_setup) =
    match inputs.github_repo_setup {
      Some((declared, ssh_key_pair)) => (
        Some(declared.repository().to_string()),
        declared.branch().map(str::to_string),
        Some(RuntimeRepoSetup { declared, ssh_key_pair, deploy_key_id: None }),
      ),
      None => (None, None, None),
    };

  Ok(PodSpec {
    id: inputs.id,
    name: inputs.name,
    slug: inputs.slug,
    base_image,
    template: cfg.template.clone(),
    resources,
    network: NetworkSpec::default(),
    services,
    install_command: cfg.install.clone(),
    processes,
    environment,
    github_repo,
    github_branch,
    github_repo_setup,
    working_dir: PodSpec::DEFAULT_WORKING_DIR.to_string(),
    user: PodSpec::DEFAULT_USER.to_string(),
    tabs: cfg.tabs.clone(),
    tier: cfg.tier.clone(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::pod::{ProcessConfig, StartCommand};

  fn base_cfg() -> DeclarativeConfig {
    DeclarativeConfig {
      version: "1.0".to_string(),
      tier: tiers::TIER_SMALL.to_string(),
      services: vec![services::WEB_TERMINAL.to_string()],
      template: None,
      install: None,
      processes: vec![],
      tabs: vec![],
    }
  }

  fn inputs() -> ExpansionInputs {
    ExpansionInputs {
      id: "pod1".to_string(),
      name: "My Pod".to_string(),
      slug: "my-pod".to_string(),
      env_set: HashMap::new(),
      github_repo_setup: None,
    }
  }

  #[test]
  fn expands_tier_into_resources() {
    let spec = expand_spec(&base_cfg(), inputs()).unwrap();
    assert_eq!(spec.resources.cpu_cores, 1.0);
    assert_eq!(spec.resources.memory_mb, 1024);
  }

  #[test]
  fn unknown_tier_is_config_invalid() {
    let mut cfg = base_cfg();
    cfg.tier = "dev.huge".to_string();
    let err = expand_spec(&cfg, inputs()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid(_)));
  }

  #[test]
  fn unknown_service_is_config_invalid() {
    let mut cfg = base_cfg();
    cfg.services.push("not-a-service".to_string());
    let err = expand_spec(&cfg, inputs()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid(_)));
  }

  #[test]
  fn new_repo_setup_without_template_is_config_invalid() {
    let cfg = base_cfg();
    let mut input = inputs();
    input.github_repo_setup = Some((
      GithubRepoSetup::New { repository: "acme/app".to_string(), branch: None },
      SshKeyPair {
        public: "ssh-ed25519 AAAA".to_string(),
        private: "priv".to_string(),
        fingerprint: "SHA256:abc".to_string(),
      },
    ));
    let err = expand_spec(&cfg, input).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid(_)));
  }

  #[test]
  fn template_base_image_is_used_when_present() {
    let mut cfg = base_cfg();
    cfg.template = Some(templates::VITE.to_string());
    let spec = expand_spec(&cfg, inputs()).unwrap();
    assert_eq!(spec.base_image, templates::template(templates::VITE).unwrap().base_image);
  }

  #[test]
  fn env_set_overrides_template_defaults() {
    let mut cfg = base_cfg();
    cfg.template = Some(templates::VITE.to_string());
    let mut input = inputs();
    input.env_set.insert("NODE_ENV".to_string(), "production".to_string());
    let spec = expand_spec(&cfg, input).unwrap();
    assert_eq!(spec.environment.get("NODE_ENV"), Some(&"production".to_string()));
  }

  #[test]
  fn expansion_is_deterministic() {
    let cfg = base_cfg();
    let first = expand_spec(&cfg, inputs()).unwrap();
    let second = expand_spec(&cfg, inputs()).unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn service_port_subdomain_encodes_internal_port_and_slug() {
    let spec = expand_spec(&base_cfg(), inputs()).unwrap();
    let port = &spec.services[0].ports[0];
    assert_eq!(port.subdomain.as_deref(), Some(format!("localhost-{}-pod-my-pod", port.internal).as_str()));
  }

  #[test]
  fn round_trips_through_declarative_config() {
    let mut cfg = base_cfg();
    cfg.install = Some(StartCommand::Single("pnpm i".to_string()));
    cfg.processes.push(ProcessConfig {
      name: "app".to_string(),
      start_command: StartCommand::Single("pnpm dev".to_string()),
      url: None,
      health_check: None,
    });
    let spec = expand_spec(&cfg, inputs()).unwrap();
    assert_eq!(spec.to_declarative_config(), cfg);
  }
}
