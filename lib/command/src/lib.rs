//! Shell argument quoting and Command Log bookkeeping shared by the
//! container runtime driver and the remote transport, per the "Dynamic
//! command composition" design note: centralize quoting in one helper so
//! both call sites agree on what "shell-safe" means.

use pinacle_client::entities::{
  docker::ExecOutput, log::PodLogRecord, pinacle_timestamp,
};

/// Capability passed into anything that needs to run commands inside a
/// pod's container — the repository integrator, the env file writer —
/// without those callers importing the pod manager or the transport
/// directly. Breaks what would otherwise be a dependency cycle between
/// "things that provision a pod" and "the pod manager that orchestrates
/// provisioning".
///
/// Implemented once, in `bin/core`, on top of the remote transport and
/// the container runtime driver's `docker exec` composition; everything
/// in this crate and in `lib/git` and `lib/environment` only sees this
/// trait.
pub trait ContainerExec: Send + Sync {
  /// Runs `argv` inside the target container, returning its output.
  /// `argv` is not pre-quoted; implementations are responsible for
  /// composing it into a shell command (via [`quote_argv`]) before
  /// dispatching it over whatever transport they use.
  fn exec_in_pod(
    &self,
    argv: &[&str],
  ) -> impl Future<Output = anyhow::Result<ExecOutput>> + Send;
}

const METACHARACTERS: &[char] =
  &['&', '|', '>', '<', '$', '(', ')', ';', '"', '\''];

/// Quotes a single shell argument exactly as §4.3's `execInContainer`
/// requires: single-quote any argument containing whitespace or a shell
/// metacharacter, escaping embedded single quotes as `'\''`. Arguments
/// with none of those are passed through unquoted.
pub fn quote_arg(arg: &str) -> String {
  let needs_quoting = arg.is_empty()
    || arg.chars().any(|c| c.is_whitespace() || METACHARACTERS.contains(&c));
  if !needs_quoting {
    return arg.to_string();
  }
  format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Joins already-tokenized argv into one shell-safe command string.
pub fn quote_argv<'a>(argv: impl IntoIterator<Item = &'a str>) -> String {
  argv.into_iter().map(quote_arg).collect::<Vec<_>>().join(" ")
}

/// Quotes a `KEY=VALUE` environment assignment: the key is never quoted
/// (callers are expected to only pass valid identifiers), the value is
/// quoted the same way any other argument would be.
pub fn quote_env_assignment(key: &str, value: &str) -> String {
  format!("{key}={}", quote_arg(value))
}

/// Wraps an already-composed command for an SSH invocation, per §4.8:
/// the whole command is single-quoted, with embedded single quotes
/// escaped the same way individual arguments are.
pub fn wrap_for_remote_shell(command: &str) -> String {
  quote_arg(command)
}

/// Starts the pre-execution Command Log row: §4.8 requires this row to
/// exist with empty output and a null exit code before the command runs.
pub fn start_log(
  pod_id: &str,
  command: impl Into<String>,
  container_command: Option<String>,
  label: Option<String>,
) -> (PodLogRecord, i64) {
  let log = PodLogRecord::pending(pod_id, command, container_command, label);
  (log, pinacle_timestamp())
}

/// Completes a Command Log row after the command finishes (or errors).
pub fn finish_log(
  log: &mut PodLogRecord,
  stdout: String,
  stderr: String,
  exit_code: Option<i32>,
  start_ts: i64,
) {
  let duration_ms = pinacle_timestamp() - start_ts;
  log.complete(stdout, stderr, exit_code, duration_ms);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn passes_through_plain_args_unquoted() {
    assert_eq!(quote_arg("pnpm"), "pnpm");
    assert_eq!(quote_arg("--version"), "--version");
  }

  #[test]
  fn quotes_whitespace_and_escapes_embedded_quotes() {
    assert_eq!(quote_arg("hello world"), "'hello world'");
    assert_eq!(quote_arg("it's"), r"'it'\''s'");
  }

  #[test]
  fn quotes_each_listed_metacharacter() {
    for c in METACHARACTERS {
      let arg = format!("a{c}b");
      let quoted = quote_arg(&arg);
      assert!(quoted.starts_with('\''), "{arg:?} -> {quoted:?}");
    }
  }

  #[test]
  fn empty_string_is_quoted() {
    assert_eq!(quote_arg(""), "''");
  }

  proptest::proptest! {
    #[test]
    fn quoted_arg_always_round_trips_through_sh(arg in ".*") {
      let quoted = quote_arg(&arg);
      // A quoted argument never contains an unescaped standalone single
      // quote that would terminate the string early: every `'` in the
      // output is either the opening/closing delimiter or immediately
      // preceded by the three-character escape `\'` ... `'`.
      if quoted.starts_with('\'') {
        prop_assert!(quoted.ends_with('\''));
      } else {
        prop_assert_eq!(quoted, arg);
      }
    }
  }
}
