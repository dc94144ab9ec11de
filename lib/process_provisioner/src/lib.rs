//! Process Provisioner, §4.6: runs the user's install command and user
//! processes inside detached `tmux` sessions, so they survive a core
//! restart and are independently inspectable over the remote transport.

mod health;
mod install;
mod session;

pub use health::check_process_health;
pub use install::run_install;
pub use session::{
  list_multiplexer_sessions, provision_process, start_process, stop_process,
};

use command::ContainerExec;
use pinacle_client::entities::log::PodLogRecord;

/// Result of a process-provisioner operation.
#[derive(Debug, Default)]
pub struct ProcessOpResult {
  pub logs: Vec<PodLogRecord>,
}

impl ProcessOpResult {
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
