use serde::{Deserialize, Serialize};

use super::MongoId;

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
  #[default]
  Online,
  Offline,
  Disabled,
}

impl ServerStatus {
  pub fn has_capacity(&self) -> bool {
    matches!(self, ServerStatus::Online)
  }
}

/// A host the core can SSH into and schedule pods onto. Stripped of the
/// cloud-provisioning and stats-monitoring concerns a full fleet manager
/// would carry — those stay out of scope for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(
  feature = "mongo",
  derive(mongo_indexed::derive::MongoIndexed)
)]
pub struct ServerRecord {
  #[serde(default, rename = "_id", skip_serializing_if = "String::is_empty")]
  pub id: MongoId,
  #[cfg_attr(feature = "mongo", unique_index)]
  pub name: String,
  /// `sshHost:sshPort`.
  pub address: String,
  pub ssh_user: String,
  /// Reference to the private key material (e.g. a config/secret key),
  /// never the key bytes themselves.
  pub private_key_ref: String,
  #[cfg_attr(feature = "mongo", index)]
  pub status: ServerStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub region: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_ping_at: Option<i64>,
}

impl ServerRecord {
  pub fn host_and_port(&self) -> Option<(&str, u16)> {
    let (host, port) = self.address.rsplit_once(':')?;
    Some((host, port.parse().ok()?))
  }
}
