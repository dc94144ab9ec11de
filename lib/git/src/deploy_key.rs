//! GitHub deploy-key registration, §2's [EXPANSION] note: once a pod's
//! repository setup has generated an SSH key pair, `githubRepoSetup.type
//! = "new"` flows can register the public half as a deploy key on the
//! target repository so the generated private key is immediately
//! authorized to push. Kept behind a trait so the rest of the
//! Repository Integrator — and the orchestrator that drives it — never
//! has to know whether a GitHub token is configured.

use std::sync::Arc;

/// Registers `public_key` as a deploy key on `owner/repo`, returning the
/// registered key's id (persisted as `PodSpec`'s
/// `github_repo_setup.deploy_key_id`). Implementations that have no
/// token configured should fail rather than silently no-op — callers
/// treat this as a best-effort step and log the error instead of
/// propagating it.
pub trait DeployKeyRegistrar: Send + Sync {
  fn register_deploy_key(
    &self,
    owner: &str,
    repo: &str,
    title: &str,
    public_key: &str,
  ) -> impl Future<Output = anyhow::Result<i64>> + Send;
}

/// The registrar used when no GitHub token is configured: the
/// integrator still writes and uses the key pair directly (the clone
/// step passes it to `ssh` regardless), it is just never registered
/// with GitHub out of band.
pub struct NoDeployKeyRegistrar;

impl DeployKeyRegistrar for NoDeployKeyRegistrar {
  async fn register_deploy_key(
    &self,
    _owner: &str,
    _repo: &str,
    _title: &str,
    _public_key: &str,
  ) -> anyhow::Result<i64> {
    anyhow::bail!(
      "no GitHub token configured; deploy key was not registered out of band"
    )
  }
}

impl<T: DeployKeyRegistrar + ?Sized> DeployKeyRegistrar for Arc<T> {
  async fn register_deploy_key(
    &self,
    owner: &str,
    repo: &str,
    title: &str,
    public_key: &str,
  ) -> anyhow::Result<i64> {
    (**self).register_deploy_key(owner, repo, title, public_key).await
  }
}

/// Registers a deploy key through `registrar` for a repository named in
/// either `owner/repo` shorthand or a full SSH/HTTPS remote URL,
/// best-effort: errors are swallowed into `None` (callers attach a
/// Command Log row / warning, per the degrade-to-warning rule the rest
/// of the network/repository integration follows).
pub async fn try_register_deploy_key(
  registrar: &impl DeployKeyRegistrar,
  repo: &str,
  pod_id: &str,
  public_key: &str,
) -> Option<i64> {
  let (owner, name) = split_owner_repo(repo)?;
  let title = format!("pinacle-pod-{pod_id}");
  match registrar.register_deploy_key(&owner, &name, &title, public_key).await {
    Ok(id) => Some(id),
    Err(e) => {
      tracing::warn!(
        pod_id,
        repo,
        "failed to register GitHub deploy key: {e:#}"
      );
      None
    }
  }
}

/// Splits `owner/repo` shorthand, `git@github.com:owner/repo.git`, or
/// `https://github.com/owner/repo(.git)?` into its `(owner, repo)`
/// parts. Returns `None` for anything else (e.g. a non-GitHub remote).
pub fn split_owner_repo(repo: &str) -> Option<(String, String)> {
  let tail = if let Some(rest) = repo.strip_prefix("git@github.com:") {
    rest
  } else if let Some(rest) = repo.strip_prefix("https://github.com/") {
    rest
  } else if let Some(rest) = repo.strip_prefix("http://github.com/") {
    rest
  } else if !repo.contains("://") && !repo.contains('@') {
    repo
  } else {
    return None;
  };
  let tail = tail.strip_suffix(".git").unwrap_or(tail);
  let (owner, name) = tail.split_once('/')?;
  if owner.is_empty() || name.is_empty() || name.contains('/') {
    return None;
  }
  Some((owner.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  #[test]
  fn splits_owner_repo_shorthand() {
    assert_eq!(
      split_owner_repo("acme/widgets"),
      Some(("acme".to_string(), "widgets".to_string()))
    );
  }

  #[test]
  fn splits_ssh_remote() {
    assert_eq!(
      split_owner_repo("git@github.com:acme/widgets.git"),
      Some(("acme".to_string(), "widgets".to_string()))
    );
  }

  #[test]
  fn splits_https_remote() {
    assert_eq!(
      split_owner_repo("https://github.com/acme/widgets.git"),
      Some(("acme".to_string(), "widgets".to_string()))
    );
    assert_eq!(
      split_owner_repo("https://github.com/acme/widgets"),
      Some(("acme".to_string(), "widgets".to_string()))
    );
  }

  #[test]
  fn rejects_non_github_remotes() {
    assert_eq!(split_owner_repo("https://gitlab.com/acme/widgets.git"), None);
  }

  struct RecordingRegistrar {
    calls: Mutex<Vec<(String, String, String)>>,
  }

  impl DeployKeyRegistrar for RecordingRegistrar {
    async fn register_deploy_key(
      &self,
      owner: &str,
      repo: &str,
      title: &str,
      _public_key: &str,
    ) -> anyhow::Result<i64> {
      self.calls.lock().unwrap().push((
        owner.to_string(),
        repo.to_string(),
        title.to_string(),
      ));
      Ok(42)
    }
  }

  #[tokio::test]
  async fn try_register_returns_id_on_success() {
    let registrar = RecordingRegistrar { calls: Mutex::new(Vec::new()) };
    let id = try_register_deploy_key(&registrar, "acme/widgets", "pod1", "ssh-ed25519 AAAA").await;
    assert_eq!(id, Some(42));
    let calls = registrar.calls.lock().unwrap();
    assert_eq!(calls[0], ("acme".to_string(), "widgets".to_string(), "pinacle-pod-pod1".to_string()));
  }

  #[tokio::test]
  async fn try_register_swallows_registrar_errors() {
    let id = try_register_deploy_key(&NoDeployKeyRegistrar, "acme/widgets", "pod1", "ssh-ed25519 AAAA").await;
    assert_eq!(id, None);
  }

  #[tokio::test]
  async fn try_register_is_none_for_unparsable_repo() {
    let registrar = RecordingRegistrar { calls: Mutex::new(Vec::new()) };
    let id = try_register_deploy_key(&registrar, "https://gitlab.com/acme/widgets", "pod1", "key").await;
    assert_eq!(id, None);
  }
}
