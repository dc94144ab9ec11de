//! Capability traits the Provisioning Orchestrator is built against
//! instead of a concrete database client — the same "break the
//! dependency cycle with a trait at the seam" shape as
//! [`command::ContainerExec`]. `bin/core` implements these over
//! `database::Client`; tests implement them over an in-memory map.

use pinacle_client::entities::dotenv::DotenvRecord;
use pinacle_client::entities::pod::PodRecord;
use pinacle_client::entities::server::ServerRecord;

pub trait PodStore: Send + Sync {
  fn load(
    &self,
    pod_id: &str,
  ) -> impl Future<Output = anyhow::Result<Option<PodRecord>>> + Send;

  fn save(
    &self,
    record: &PodRecord,
  ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub trait ServerStore: Send + Sync {
  fn get(
    &self,
    server_id: &str,
  ) -> impl Future<Output = anyhow::Result<Option<ServerRecord>>> + Send;

  /// Picks any `online` host. Capacity-aware scheduling is out of scope.
  fn any_online(
    &self,
  ) -> impl Future<Output = anyhow::Result<Option<ServerRecord>>> + Send;
}

pub trait EnvSetStore: Send + Sync {
  fn get(
    &self,
    env_set_id: &str,
  ) -> impl Future<Output = anyhow::Result<Option<DotenvRecord>>> + Send;
}

/// Resolves a [`ServerRecord::private_key_ref`] to the actual PEM bytes
/// the transport needs. Kept separate from `ServerStore` so the secret
/// material never has to pass through the pod/server persistence layer.
pub trait KeyResolver: Send + Sync {
  fn resolve_private_key(
    &self,
    key_ref: &str,
  ) -> impl Future<Output = anyhow::Result<String>> + Send;
}
