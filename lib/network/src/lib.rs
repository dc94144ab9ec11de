//! Network Manager, §4.4: per-pod bridge network lifecycle, subnet and
//! port allocation, and best-effort network policy. Port reservations
//! are kept in-process (see [`ports::PortAllocator`]); everything else
//! is derived fresh from the remote engine on each call.

mod bridge;
mod policy;
mod ports;
mod subnet;

pub use ports::{PORT_RANGE_END, PORT_RANGE_START, PortAllocator};
pub use subnet::AllocatedSubnet;

use pinacle_client::entities::docker::PortMapping;
use pinacle_client::entities::spec::NetworkSpec;
use transport::RemoteTransport;

/// Binds network operations to one host's transport and the process-wide
/// port table.
pub struct NetworkManager<'a> {
  transport: &'a RemoteTransport,
  ports: &'a PortAllocator,
}

impl<'a> NetworkManager<'a> {
  pub fn new(transport: &'a RemoteTransport, ports: &'a PortAllocator) -> Self {
    Self { transport, ports }
  }

  /// Creates the pod's bridge network and allocates its subnet,
  /// returning the pieces the caller must bind into `spec.network`.
  pub async fn create_pod_network(
    &self,
    pod_id: &str,
  ) -> anyhow::Result<AllocatedSubnet> {
    bridge::create_pod_network(self.transport, pod_id).await
  }

  /// Destroys the pod's bridge network. Idempotent.
  pub async fn destroy_pod_network(&self, pod_id: &str) -> anyhow::Result<()> {
    bridge::destroy_pod_network(self.transport, pod_id).await
  }

  /// Attaches a container to the pod's network at a specific IP, for
  /// implementations that create containers on the default bridge and
  /// attach the per-pod network afterward.
  pub async fn connect_container(
    &self,
    pod_id: &str,
    container_id: &str,
    pod_ip: &str,
  ) -> anyhow::Result<()> {
    bridge::connect_container(self.transport, pod_id, container_id, pod_ip).await
  }

  /// Allocates the single externally-exposed `nginx-proxy` port and
  /// returns the fully-formed [`PortMapping`] to push onto
  /// `spec.network.ports`.
  pub async fn allocate_reverse_proxy_port(
    &self,
    pod_id: &str,
  ) -> anyhow::Result<PortMapping> {
    let port = self.ports.allocate_port(self.transport, pod_id, "nginx-proxy").await?;
    Ok(PortMapping::reverse_proxy(port))
  }

  /// Allocates an arbitrary internal-only port for a service.
  pub async fn allocate_port(
    &self,
    pod_id: &str,
    service_name: &str,
  ) -> anyhow::Result<u16> {
    self.ports.allocate_port(self.transport, pod_id, service_name).await
  }

  pub fn release_port(&self, pod_id: &str, port: u16) {
    self.ports.release_port(pod_id, port);
  }

  pub fn release_all_ports(&self, pod_id: &str) {
    self.ports.release_all(pod_id);
  }

  /// Applies egress/ingress/bandwidth policy, best-effort.
  pub async fn apply_network_policy(
    &self,
    pod_id: &str,
    network: &NetworkSpec,
  ) -> anyhow::Result<()> {
    policy::apply_network_policy(self.transport, pod_id, network).await
  }
}
