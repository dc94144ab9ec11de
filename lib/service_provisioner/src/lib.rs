//! Service Provisioner, §4.5: installs and supervises built-in services
//! chosen from the service registry. Every operation runs inside the
//! pod's container via [`command::ContainerExec`] — the same capability
//! the Repository Integrator uses — so install/start/stop compose with
//! the same Command Log bookkeeping.

mod health;
mod install;
mod unit;

pub use health::{check_service_health, wait_for_service_healthy};
pub use install::provision_service;
pub use unit::{remove_service, start_service, stop_service};

use command::ContainerExec;
use pinacle_client::entities::log::PodLogRecord;

/// Result of a service-provisioner operation: every step's Command Log
/// row plus whether the overall operation succeeded.
#[derive(Debug, Default)]
pub struct ServiceOpResult {
  pub logs: Vec<PodLogRecord>,
}

impl ServiceOpResult {
  pub fn success(&self) -> bool {
    self.logs.iter().all(PodLogRecord::success)
  }
}

pub(crate) async fn run(
  exec: &impl ContainerExec,
  pod_id: &str,
  label: &str,
  working_dir: &str,
  command_str: &str,
) -> PodLogRecord {
  let wrapped = format!("cd {} && {command_str}", command::quote_arg(working_dir));
  let argv = ["sh", "-c", wrapped.as_str()];
  let (mut log, start_ts) = command::start_log(
    pod_id,
    wrapped.clone(),
    Some(wrapped.clone()),
    Some(label.to_string()),
  );
  match exec.exec_in_pod(&argv).await {
    Ok(output) => command::finish_log(
      &mut log,
      output.stdout,
      output.stderr,
      Some(output.exit_code),
      start_ts,
    ),
    Err(e) => {
      command::finish_log(&mut log, String::new(), e.to_string(), None, start_ts)
    }
  }
  log
}

/// Convenience used by every operation in this crate to resolve a
/// service spec's registry entry. An unknown service id here is a
/// programmer error — the registry validates ids at spec-expansion time
/// — so callers are expected to have already checked `expand_spec`
/// succeeded.
pub(crate) fn entry_for(name: &str) -> anyhow::Result<registry::services::ServiceEntry> {
  registry::services::entry(name)
    .ok_or_else(|| anyhow::anyhow!("unknown service `{name}` reached provisioner"))
}
