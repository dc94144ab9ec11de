use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type TierId = String;
pub type ServiceId = String;
pub type TemplateId = String;

/// A resource tier's concrete shape, one entry per `dev.{small,medium,
/// large,xlarge}`. The table mapping ids to these lives in the `registry`
/// crate; this type is the shape both that crate and the spec-expansion
/// function agree on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
  pub cpu_cores: f64,
  pub memory_mb: u64,
  pub storage_mb: u64,
}

/// A built-in service's definition. `start_command` and `health_check`
/// are functions of the expanded spec rather than fixed strings, since
/// both may need to reference the pod's working directory or another
/// service's allocated port; the registry crate stores these as function
/// pointers keyed by [ServiceId], with this struct as their shared
/// static metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
  pub id: ServiceId,
  pub install_steps: Vec<String>,
  pub default_port: Option<u16>,
  pub default_env: HashMap<String, String>,
  pub required_env: Vec<String>,
  pub depends_on: Vec<ServiceId>,
  /// How long to wait after `supervisorctl start` returns before the
  /// first health check, §4.5: "fail if not healthy after the
  /// configured start delay and retries."
  pub start_delay_secs: u64,
  /// How many additional health-check attempts to make (two seconds
  /// apart) after the first one, before `startPod`/`createPod` gives up
  /// and reports `ServiceStartFailed`.
  pub health_retries: u32,
}

/// A project template's definition: the base image to build the pod's
/// container from and the shell steps to scaffold a new repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
  pub id: TemplateId,
  pub base_image: String,
  pub init_script: Vec<String>,
  pub default_env: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tier_spec_is_serializable() {
    let tier = TierSpec { cpu_cores: 1.0, memory_mb: 1024, storage_mb: 10240 };
    let json = serde_json::to_string(&tier).unwrap();
    let parsed: TierSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, tier);
  }
}
