//! `generateSSHKeyPair`, §4.7: an ed25519 deploy-key pair for a pod's
//! repository setup. Generated entirely in memory via the `ssh-key`
//! crate — there is no temp file to clean up on this path, unlike the
//! remote transport's materialized key (that one has to touch disk
//! because `ssh` the binary needs a path).

use ssh_key::{Algorithm, LineEnding, PrivateKey, rand_core::OsRng};

use pinacle_client::entities::spec::SshKeyPair;

/// Generates a fresh ed25519 key pair, labeling the public key's comment
/// with the pod id so `ssh-keygen -l` / GitHub's deploy-key UI shows
/// which pod a key belongs to.
pub fn generate_ssh_key_pair(
  pod_id: &str,
) -> anyhow::Result<SshKeyPair> {
  let mut private_key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)?;
  private_key.set_comment(format!("pinacle-pod-{pod_id}"));
  let fingerprint = private_key.fingerprint(Default::default()).to_string();
  let public = private_key.public_key().to_openssh()?;
  let private = private_key.to_openssh(LineEnding::LF)?.to_string();
  Ok(SshKeyPair { public, private, fingerprint })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generates_distinct_ed25519_keys() {
    let a = generate_ssh_key_pair("pod1").unwrap();
    let b = generate_ssh_key_pair("pod2").unwrap();
    assert_ne!(a.private, b.private);
    assert!(a.public.starts_with("ssh-ed25519"));
    assert!(a.private.contains("BEGIN OPENSSH PRIVATE KEY"));
    assert!(a.fingerprint.starts_with("SHA256:"));
  }

  #[test]
  fn public_key_comment_carries_pod_id() {
    let pair = generate_ssh_key_pair("abc123").unwrap();
    assert!(pair.public.contains("pinacle-pod-abc123"));
  }
}
