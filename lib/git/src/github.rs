//! `octorust`-backed [`DeployKeyRegistrar`], used when `CoreConfig`
//! carries a GitHub API token. Kept in its own module so the rest of
//! the Repository Integrator only ever sees the trait.

use octorust::auth::Credentials;
use octorust::types::ReposCreateDeployKeyRequest;

use crate::deploy_key::DeployKeyRegistrar;

/// Wraps an authenticated `octorust::Client`. Construction fails closed:
/// an empty token yields a registrar whose every call errors, matching
/// [`crate::NoDeployKeyRegistrar`]'s contract without a second type.
pub struct GithubDeployKeys {
  client: Option<octorust::Client>,
}

impl GithubDeployKeys {
  pub fn new(token: &str) -> Self {
    if token.is_empty() {
      return Self { client: None };
    }
    let client =
      octorust::Client::new("pinacle-core", Credentials::Token(token.to_string()))
        .ok();
    Self { client }
  }
}

impl DeployKeyRegistrar for GithubDeployKeys {
  async fn register_deploy_key(
    &self,
    owner: &str,
    repo: &str,
    title: &str,
    public_key: &str,
  ) -> anyhow::Result<i64> {
    let client = self
      .client
      .as_ref()
      .ok_or_else(|| anyhow::anyhow!("no GitHub token configured"))?;
    let body = ReposCreateDeployKeyRequest {
      key: public_key.to_string(),
      read_only: Some(false),
      title: title.to_string(),
    };
    let response = client.repos().create_deploy_key(owner, repo, &body).await?;
    Ok(response.body.id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn empty_token_fails_closed() {
    let registrar = GithubDeployKeys::new("");
    let err = registrar
      .register_deploy_key("acme", "widgets", "title", "ssh-ed25519 AAAA")
      .await
      .unwrap_err();
    assert!(err.to_string().contains("no GitHub token"));
  }
}
