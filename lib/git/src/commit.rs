use command::ContainerExec;

use crate::{GitRes, read_latest_commit, run};

/// Stages everything, commits (tolerating "nothing to commit"), and
/// force-pushes `branch`. Used by [`crate::initialize_template`] for its
/// initial commit, and available for anything else that needs to push a
/// change made inside a pod's working directory.
pub async fn commit_and_push(
  pod_id: &str,
  message: &str,
  branch: &str,
  working_dir: &str,
  exec: &impl ContainerExec,
) -> GitRes {
  let mut logs =
    vec![run(exec, pod_id, "Add Files", working_dir, "git add -A").await];
  if !logs.last().unwrap().success() {
    return GitRes { logs, hash: None, message: None };
  }

  let commit_cmd =
    format!("git commit -m {} || true", command::quote_arg(message));
  logs.push(run(exec, pod_id, "Commit", working_dir, &commit_cmd).await);

  let (log, hash, message) =
    read_latest_commit(exec, pod_id, working_dir).await;
  logs.push(log);

  let push_cmd =
    format!("git push -u origin {}", command::quote_arg(branch));
  logs.push(run(exec, pod_id, "Push", working_dir, &push_cmd).await);

  GitRes { logs, hash, message }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::docker::ExecOutput;
  use std::sync::Mutex;

  struct RecordingExec {
    calls: Mutex<Vec<String>>,
  }

  impl ContainerExec for RecordingExec {
    async fn exec_in_pod(
      &self,
      argv: &[&str],
    ) -> anyhow::Result<ExecOutput> {
      self.calls.lock().unwrap().push(argv.join(" "));
      Ok(ExecOutput {
        stdout: "deadbeef\nfix: x".to_string(),
        stderr: String::new(),
        exit_code: 0,
      })
    }
  }

  #[tokio::test]
  async fn commits_and_pushes_in_order() {
    let exec = RecordingExec { calls: Mutex::new(Vec::new()) };
    let res =
      commit_and_push("pod1", "Initial commit", "main", "/workspace", &exec)
        .await;
    assert!(res.success());
    assert_eq!(res.hash.as_deref(), Some("deadbeef"));
    let calls = exec.calls.lock().unwrap();
    assert!(calls[0].contains("git add -A"));
    assert!(calls[1].contains("git commit"));
    assert!(calls.last().unwrap().contains("git push -u origin main"));
  }
}
