use serde::{Deserialize, Serialize};

use super::MongoId;

/// A single `KEY=value` pair, the unit the environment-set, the declarative
/// config's `environment`, and the container's `-e` flags are all built
/// from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentVar {
  pub variable: String,
  pub value: String,
}

impl EnvironmentVar {
  pub fn parse_list(vars: &[EnvironmentVar]) -> Vec<(String, String)> {
    vars
      .iter()
      .map(|v| (v.variable.clone(), v.value.clone()))
      .collect()
  }
}

/// A named, reusable set of environment variables a pod can reference.
/// Persisted independently of the pod so multiple pods can share one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(
  feature = "mongo",
  derive(mongo_indexed::derive::MongoIndexed)
)]
pub struct DotenvRecord {
  #[serde(default, rename = "_id", skip_serializing_if = "String::is_empty")]
  pub id: MongoId,
  #[cfg_attr(feature = "mongo", unique_index)]
  pub name: String,
  #[serde(default)]
  pub variables: Vec<EnvironmentVar>,
  /// The raw `.env`-formatted content, if the set was authored that way
  /// rather than built up field by field. When present, this is what gets
  /// written verbatim to the cloned project's `.env` file in step 7 of
  /// the provisioning sequence.
  #[serde(default)]
  pub raw_content: Option<String>,
}

impl DotenvRecord {
  /// Materializes `raw_content` if set, otherwise serializes `variables`
  /// in `KEY=value` form, one per line.
  pub fn to_env_file_contents(&self) -> String {
    if let Some(raw) = &self.raw_content {
      return raw.clone();
    }
    self
      .variables
      .iter()
      .map(|v| format!("{}={}", v.variable, v.value))
      .collect::<Vec<_>>()
      .join("\n")
  }
}
