use serde::{Deserialize, Serialize};

use super::pinacle_timestamp;

/// In-process lifecycle events the pod manager emits to local subscribers.
/// Event loss is acceptable — nothing downstream of this process depends
/// on durable delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodEvent {
  pub pod_id: String,
  pub timestamp: i64,
  pub kind: PodEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PodEventKind {
  Created,
  Started,
  Stopped,
  Failed { error: String },
  Deleted,
  HealthCheck { healthy: bool },
}

impl PodEvent {
  pub fn new(pod_id: impl Into<String>, kind: PodEventKind) -> Self {
    Self {
      pod_id: pod_id.into(),
      timestamp: pinacle_timestamp(),
      kind,
    }
  }
}
