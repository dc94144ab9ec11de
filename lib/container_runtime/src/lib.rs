//! Container Runtime Driver, §4.3: drives a container engine on the
//! remote host via shell commands, pinning every container to the
//! sandboxed runtime. All state (which containers/volumes exist) lives
//! on the remote host; this crate only composes and parses commands
//! over a [`transport::RemoteTransport`].

mod create;
mod exec;
mod inspect;
mod lifecycle;

pub use create::CreateError;
pub use inspect::{inspect_container, list_containers};
pub use lifecycle::RemoveOptions;

use pinacle_client::entities::docker::ContainerInfo;
use pinacle_client::entities::spec::PodSpec;
use transport::RemoteTransport;

/// Binds the driver's operations to one host and one sandboxed runtime
/// name (`--runtime=<sandbox>`, e.g. `runsc`).
pub struct ContainerRuntime<'a> {
  pub transport: &'a RemoteTransport,
  pub sandbox_runtime: String,
}

impl<'a> ContainerRuntime<'a> {
  pub fn new(transport: &'a RemoteTransport, sandbox_runtime: impl Into<String>) -> Self {
    Self { transport, sandbox_runtime: sandbox_runtime.into() }
  }

  /// `createContainer(spec)`. Replaces any container already holding the
  /// pod's target name, ensures universal volumes exist, and composes
  /// the full `docker create` invocation. Returns the new container id.
  pub async fn create_container(
    &self,
    spec: &PodSpec,
  ) -> Result<String, create::CreateError> {
    create::create_container(self.transport, &self.sandbox_runtime, spec).await
  }

  /// `startContainer(id)`: start, briefly wait, then require `running`.
  pub async fn start_container(
    &self,
    container_id: &str,
  ) -> anyhow::Result<()> {
    lifecycle::start_container(self.transport, container_id).await
  }

  /// `stopContainer(id)`: swallows "already gone".
  pub async fn stop_container(&self, container_id: &str) -> anyhow::Result<()> {
    lifecycle::stop_container(self.transport, container_id).await
  }

  /// `removeContainer(id, { removeVolumes })`.
  pub async fn remove_container(
    &self,
    container_id: &str,
    opts: RemoveOptions,
  ) -> anyhow::Result<()> {
    lifecycle::remove_container(self.transport, container_id, opts).await
  }

  /// `getContainer(id) -> ContainerInfo | null`. Absence is `Ok(None)`,
  /// not an error.
  pub async fn get_container(
    &self,
    id_or_name: &str,
  ) -> anyhow::Result<Option<ContainerInfo>> {
    inspect::inspect_container(self.transport, id_or_name).await
  }

  /// `listContainers(filters?)`.
  pub async fn list_containers(
    &self,
    name_filter: Option<&str>,
  ) -> anyhow::Result<Vec<ContainerInfo>> {
    inspect::list_containers(self.transport, name_filter).await
  }

  /// `execInContainer(podId, containerId, argv)`.
  pub async fn exec_in_container(
    &self,
    container_id: &str,
    argv: &[&str],
  ) -> anyhow::Result<pinacle_client::entities::docker::ExecOutput> {
    exec::exec_in_container(self.transport, container_id, argv).await
  }

  /// `getContainerLogs(id, { tail, follow })`. `follow` streams until
  /// the caller's own timeout kills the underlying ssh process; this
  /// crate makes no attempt to bound it itself.
  pub async fn get_container_logs(
    &self,
    container_id: &str,
    tail: Option<u32>,
    follow: bool,
  ) -> anyhow::Result<String> {
    exec::container_logs(self.transport, container_id, tail, follow).await
  }

  /// `validateSandboxRuntime()`: probes the engine for the configured
  /// runtime's availability via `docker info`.
  pub async fn validate_sandbox_runtime(&self) -> anyhow::Result<bool> {
    exec::validate_sandbox_runtime(self.transport, &self.sandbox_runtime).await
  }
}
