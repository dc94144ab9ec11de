//! `createContainer(spec)`, §4.3.

use command::{quote_arg, quote_env_assignment};
use pinacle_client::entities::docker::{
  UNIVERSAL_VOLUME_ROLES, container_name, volume_name,
};
use pinacle_client::entities::spec::PodSpec;
use transport::{ExecOptions, RemoteTransport};

use crate::inspect::inspect_container;
use crate::lifecycle::{RemoveOptions, remove_container};

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
  #[error("docker create failed (exit {exit_code:?}): {stderr}")]
  DockerCreate { exit_code: i32, stderr: String },
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

const CPU_PERIOD_US: u64 = 100_000;

/// Creates the pod's container. If a container already holds the target
/// name (a stale container from a prior failed provision, or a
/// recreation per §3's "Recreate persistence" scenario), it is replaced
/// first — its volumes are left alone, since the whole point of a
/// recreate is to reattach to them.
pub async fn create_container(
  transport: &RemoteTransport,
  sandbox_runtime: &str,
  spec: &PodSpec,
) -> Result<String, CreateError> {
  let name = container_name(&spec.id);

  if inspect_container(transport, &name).await?.is_some() {
    remove_container(transport, &name, RemoveOptions { remove_volumes: false })
      .await?;
  }

  for (role, _) in UNIVERSAL_VOLUME_ROLES {
    ensure_volume(transport, &spec.id, role).await?;
  }

  let command = build_create_command(sandbox_runtime, spec, &name);
  let output = transport
    .exec(&command, ExecOptions { sudo: true })
    .await
    .map_err(anyhow::Error::from)?;
  if !output.success() {
    return Err(CreateError::DockerCreate {
      exit_code: output.exit_code,
      stderr: output.stderr,
    });
  }
  Ok(output.stdout.trim().to_string())
}

async fn ensure_volume(
  transport: &RemoteTransport,
  pod_id: &str,
  role: &str,
) -> anyhow::Result<()> {
  let name = volume_name(pod_id, role);
  let command = format!(
    "docker volume inspect {name} >/dev/null 2>&1 || docker volume create {name} >/dev/null"
  );
  let output = transport.exec(&command, ExecOptions { sudo: true }).await?;
  if !output.success() {
    anyhow::bail!(
      "failed to ensure volume {name}: {}",
      output.stderr
    );
  }
  Ok(())
}

fn build_create_command(
  sandbox_runtime: &str,
  spec: &PodSpec,
  name: &str,
) -> String {
  let mut parts = vec![
    "docker".to_string(),
    "create".to_string(),
    "--name".to_string(),
    name.to_string(),
    format!("--runtime={sandbox_runtime}"),
    format!("--memory={}m", spec.resources.memory_limit_mib()),
    format!("--cpu-period={CPU_PERIOD_US}"),
    format!(
      "--cpu-quota={}",
      spec.resources.cpu_quota(CPU_PERIOD_US)
    ),
    "--security-opt".to_string(),
    "seccomp=unconfined".to_string(),
    "--cap-drop=ALL".to_string(),
    "--cap-add=NET_BIND_SERVICE".to_string(),
    "--network".to_string(),
    "bridge".to_string(),
  ];

  for port in &spec.network.ports {
    if let Some(external) = port.external {
      parts.push("-p".to_string());
      parts.push(format!("{external}:{}/{}", port.internal, port.protocol));
    }
  }

  for (key, value) in &spec.environment {
    parts.push("-e".to_string());
    parts.push(quote_env_assignment(key, value));
  }

  for (role, path) in UNIVERSAL_VOLUME_ROLES {
    parts.push("-v".to_string());
    parts.push(format!("{}:{path}", volume_name(&spec.id, role)));
  }

  parts.push("--workdir".to_string());
  parts.push(spec.working_dir.clone());
  parts.push("--user".to_string());
  parts.push(spec.user.clone());

  parts.push(quote_arg(&spec.base_image));
  // Default command: an init-like PID 1 that keeps the container alive
  // and reaps zombie processes from service/process supervisors.
  parts.push("tail".to_string());
  parts.push("-f".to_string());
  parts.push("/dev/null".to_string());

  parts.join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::docker::{PortMapping, PortProtocol};
  use pinacle_client::entities::spec::{NetworkSpec, ResourceSpec};
  use std::collections::HashMap;

  fn sample_spec() -> PodSpec {
    PodSpec {
      id: "pod1".to_string(),
      name: "my app".to_string(),
      slug: "my-app".to_string(),
      base_image: "pinacle/base:latest".to_string(),
      template: None,
      resources: ResourceSpec { cpu_cores: 1.5, memory_mb: 1024, storage_mb: 10240 },
      network: NetworkSpec {
        ports: vec![
          PortMapping::reverse_proxy(30001),
          PortMapping {
            name: "internal-only".to_string(),
            internal: 5000,
            external: None,
            protocol: PortProtocol::Tcp,
            public: false,
            subdomain: None,
          },
        ],
        ..Default::default()
      },
      services: vec![],
      install_command: None,
      processes: vec![],
      environment: HashMap::from([(
        "FOO".to_string(),
        "bar baz".to_string(),
      )]),
      github_repo: None,
      github_branch: None,
      github_repo_setup: None,
      working_dir: PodSpec::DEFAULT_WORKING_DIR.to_string(),
      user: PodSpec::DEFAULT_USER.to_string(),
      tabs: vec![],
      tier: "dev.small".to_string(),
    }
  }

  #[test]
  fn command_only_publishes_ports_with_external() {
    let cmd = build_create_command("runsc", &sample_spec(), "pinacle-pod-pod1");
    assert!(cmd.contains("-p 30001:80/tcp"));
    assert!(!cmd.contains("5000:5000"));
  }

  #[test]
  fn cpu_and_memory_translate_per_tier_rule() {
    let cmd = build_create_command("runsc", &sample_spec(), "pinacle-pod-pod1");
    assert!(cmd.contains("--memory=1024m"));
    assert!(cmd.contains("--cpu-period=100000"));
    assert!(cmd.contains("--cpu-quota=150000"));
  }

  #[test]
  fn drops_all_capabilities_except_net_bind_service() {
    let cmd = build_create_command("runsc", &sample_spec(), "pinacle-pod-pod1");
    assert!(cmd.contains("--cap-drop=ALL"));
    assert!(cmd.contains("--cap-add=NET_BIND_SERVICE"));
  }

  #[test]
  fn env_values_are_shell_quoted() {
    let cmd = build_create_command("runsc", &sample_spec(), "pinacle-pod-pod1");
    assert!(cmd.contains("-e FOO='bar baz'"));
  }

  #[test]
  fn mounts_every_universal_volume() {
    let cmd = build_create_command("runsc", &sample_spec(), "pinacle-pod-pod1");
    for (role, path) in UNIVERSAL_VOLUME_ROLES {
      assert!(cmd.contains(&format!("{}:{path}", volume_name("pod1", role))));
    }
  }
}
