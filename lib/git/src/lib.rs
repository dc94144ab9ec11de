//! Repository Integrator primitives: clone an existing repo or initialize
//! a fresh one from a template, and commit/push the result. Everything
//! here runs inside a pod's container — there is no local working
//! directory — so every function takes a [`command::ContainerExec`]
//! instead of a filesystem path.

pub mod clone;
pub mod commit;
pub mod deploy_key;
pub mod github;
pub mod init;
pub mod inject;
pub mod keys;

pub use clone::clone_repository;
pub use commit::commit_and_push;
pub use deploy_key::{DeployKeyRegistrar, NoDeployKeyRegistrar, split_owner_repo, try_register_deploy_key};
pub use github::GithubDeployKeys;
pub use init::initialize_template;
pub use inject::inject_pinacle_config;
pub use keys::generate_ssh_key_pair;

use command::{ContainerExec, quote_arg};
use pinacle_client::entities::log::PodLogRecord;

/// Result of a repository operation: every step's Command Log row, plus
/// the latest commit hash/message if one could be read.
#[derive(Debug, Default)]
pub struct GitRes {
  pub logs: Vec<PodLogRecord>,
  pub hash: Option<String>,
  pub message: Option<String>,
}

impl GitRes {
  pub fn success(&self) -> bool {
    self.logs.iter().all(PodLogRecord::success)
  }
}

/// Runs `command` inside `working_dir` in the pod's container, recording
/// a Command Log row for it.
pub(crate) async fn run(
  exec: &impl ContainerExec,
  pod_id: &str,
  label: &str,
  working_dir: &str,
  command: &str,
) -> PodLogRecord {
  let wrapped = format!("cd {} && {command}", quote_arg(working_dir));
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

/// Reads the latest commit hash and subject line via `git log -1`.
/// Never fails the overall operation: on error the returned hash and
/// message are `None` and the log row carries the failure.
pub(crate) async fn read_latest_commit(
  exec: &impl ContainerExec,
  pod_id: &str,
  working_dir: &str,
) -> (PodLogRecord, Option<String>, Option<String>) {
  let log = run(
    exec,
    pod_id,
    "Latest Commit",
    working_dir,
    "git log -1 --pretty=format:%H%n%s",
  )
  .await;
  if !log.success() {
    return (log, None, None);
  }
  let mut lines = log.stdout.lines();
  let hash = lines.next().map(str::to_string);
  let message = if lines.clone().count() > 0 {
    Some(lines.collect::<Vec<_>>().join("\n"))
  } else {
    None
  };
  (log, hash, message)
}

/// Coerces `owner/repo` shorthand into a full SSH remote URL; anything
/// already containing a scheme or an `@` (ssh/https/git@ forms) is
/// passed through unchanged.
pub(crate) fn coerce_repo_url(repo: &str) -> String {
  let looks_like_shorthand = !repo.contains("://")
    && !repo.contains('@')
    && repo.matches('/').count() == 1;
  if looks_like_shorthand {
    format!("git@github.com:{repo}.git")
  } else {
    repo.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coerces_owner_repo_shorthand() {
    assert_eq!(
      coerce_repo_url("acme/widgets"),
      "git@github.com:acme/widgets.git"
    );
  }

  #[test]
  fn leaves_full_urls_untouched() {
    assert_eq!(
      coerce_repo_url("git@github.com:acme/widgets.git"),
      "git@github.com:acme/widgets.git"
    );
    assert_eq!(
      coerce_repo_url("https://github.com/acme/widgets.git"),
      "https://github.com/acme/widgets.git"
    );
  }
}
