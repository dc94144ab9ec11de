use thiserror::Error;

/// The closed error taxonomy from the error-handling design. Modeled as a
/// sum type rather than stringly-typed errors crossing module boundaries,
/// per the "Sum-type status" / error design notes.
#[derive(Debug, Error)]
pub enum CoreError {
  /// Declarative config fails schema validation, or names an unknown tier
  /// / service / template. No remote side effects have occurred.
  #[error("invalid pod config: {0}")]
  ConfigInvalid(String),

  /// No server with capacity was found, or transport to the assigned host
  /// failed its initial connectivity check. No remote effects.
  #[error("host unavailable: {0}")]
  HostUnavailable(String),

  /// A remote shell command failed at the transport layer.
  #[error("transport error running `{command}` (exit {exit_code:?}): {stderr}")]
  TransportError {
    command: String,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
  },

  /// The subnet or port allocator exhausted its range. No partial state
  /// is left behind.
  #[error("network allocation exhausted: {0}")]
  NetworkAllocationExhausted(String),

  /// Container creation failed; triggers reverse-order teardown.
  #[error("container create failed: {0}")]
  ContainerCreateFailed(String),

  /// Container start failed (or never reached `running`); triggers
  /// reverse-order teardown.
  #[error("container start failed: {0}")]
  ContainerStartFailed(String),

  /// A built-in service failed to install or provision. Fatal for
  /// provisioning.
  #[error("service `{service}` provisioning failed: {reason}")]
  ServiceProvisionFailed { service: String, reason: String },

  /// A built-in service failed to (re)start. May be retried.
  #[error("service `{service}` failed to start: {reason}")]
  ServiceStartFailed { service: String, reason: String },

  /// The user's install command failed. Fatal for new-repo pods, logged
  /// only for existing-repo pods — the caller decides which using
  /// `is_existing_repo`.
  #[error("install command failed: {0}")]
  InstallFailed(String),

  /// A user process failed to start. Logged and surfaced, but the pod
  /// remains running.
  #[error("process `{process}` failed to start: {reason}")]
  ProcessStartFailed { process: String, reason: String },

  /// Attempting to remove a container / network that is already gone.
  /// Callers should treat this as success, not failure.
  #[error("already gone: {0}")]
  AlreadyGone(String),

  /// Catch-all for anything not otherwise classified, preserving its
  /// source chain.
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl CoreError {
  /// Whether this error should trigger reverse-order teardown in the
  /// pod manager's `createPod` pipeline.
  pub fn is_fatal_for_provision(&self) -> bool {
    !matches!(self, CoreError::AlreadyGone(_))
  }
}
