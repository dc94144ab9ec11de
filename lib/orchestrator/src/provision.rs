//! Provisioning Orchestrator, §4.1: the single entry point that turns a
//! pod id plus its persisted [`DeclarativeConfig`] into a running pod (or
//! tears one back down), gluing together the repository traits, spec
//! expansion, interpolation, and a per-host [`PodManager`].

use std::collections::HashMap;
use std::sync::Arc;

use container_runtime::RemoveOptions;
use dashmap::DashMap;
use network::PortAllocator;
use pinacle_client::entities::docker::container_name;
use pinacle_client::entities::error::CoreError;
use pinacle_client::entities::pod::{GithubRepoSetup, PodRecord, PodStatus};
use pinacle_client::entities::server::ServerRecord;
use registry::expand::ExpansionInputs;
use transport::{HostConfig, PodExec, RemoteTransport};

use crate::lock::PodLocks;
use crate::pod_manager::PodManager;
use crate::repository::{EnvSetStore, KeyResolver, PodStore, ServerStore};

/// `provisionPod`'s input, §4.1: a bare pod id the caller has already
/// persisted a [`PodRecord`] for, plus the out-of-band repo setup
/// request a fresh provision may carry.
pub struct ProvisionRequest {
  pub pod_id: String,
  /// Pins the pod to a specific host; `None` lets the orchestrator pick
  /// any server with capacity.
  pub server_id: Option<String>,
  pub github_repo_setup: Option<GithubRepoSetup>,
  /// Whether `cleanupPod` should run automatically on a fatal
  /// provisioning failure, per §4.1's `cleanupOnError` flag.
  pub cleanup_on_error: bool,
}

impl ProvisionRequest {
  pub fn new(pod_id: impl Into<String>) -> Self {
    Self {
      pod_id: pod_id.into(),
      server_id: None,
      github_repo_setup: None,
      cleanup_on_error: true,
    }
  }
}

/// Binds the four repository capability traits plus the ambient runtime
/// settings (sandbox runtime name, process-wide port table) into the
/// single object `bin/core` drives. Holds one lazily-built
/// [`PodManager`] per server, since each needs its own
/// [`RemoteTransport`].
pub struct ProvisioningOrchestrator<P, S, E, K> {
  pods: P,
  servers: S,
  env_sets: E,
  keys: K,
  sandbox_runtime: String,
  /// Domain pods are published under, §3: `publicUrl = https://{slug}.{baseDomain}`.
  base_domain: String,
  ports: Arc<PortAllocator>,
  managers: DashMap<String, Arc<PodManager>>,
  deploy_keys: Arc<dyn git::DeployKeyRegistrar>,
  /// Per-pod keyed mutex, §5: two concurrent operations on the same pod
  /// id are serialized; different pod ids never contend with each
  /// other. Acquired in every public entry point before the pod record
  /// is read and released when the method returns.
  locks: PodLocks,
}

impl<P, S, E, K> ProvisioningOrchestrator<P, S, E, K>
where
  P: PodStore,
  S: ServerStore,
  E: EnvSetStore,
  K: KeyResolver,
{
  pub fn new(pods: P, servers: S, env_sets: E, keys: K, sandbox_runtime: impl Into<String>) -> Self {
    Self::with_deploy_key_registrar(
      pods,
      servers,
      env_sets,
      keys,
      sandbox_runtime,
      Arc::new(git::NoDeployKeyRegistrar),
    )
  }

  /// As [`Self::new`], but with an explicit deploy-key registrar —
  /// `bin/core`/`bin/cli` pass [`git::GithubDeployKeys`] when a GitHub
  /// token is configured, per §2's EXPANSION note. Uses the default
  /// `[30000, 40000]` port range and `pinacle.dev` base domain; see
  /// [`Self::with_port_range`] to honor `CoreConfig`'s configurable
  /// values for both.
  pub fn with_deploy_key_registrar(
    pods: P,
    servers: S,
    env_sets: E,
    keys: K,
    sandbox_runtime: impl Into<String>,
    deploy_keys: Arc<dyn git::DeployKeyRegistrar>,
  ) -> Self {
    Self {
      pods,
      servers,
      env_sets,
      keys,
      sandbox_runtime: sandbox_runtime.into(),
      base_domain: pinacle_client::entities::config::default_base_domain(),
      ports: Arc::new(PortAllocator::new()),
      managers: DashMap::new(),
      deploy_keys,
      locks: PodLocks::new(),
    }
  }

  /// As [`Self::with_deploy_key_registrar`], additionally honoring
  /// `CoreConfig.port_range_start`/`port_range_end`/`base_domain` rather
  /// than the allocator's `[30000, 40000]`/`pinacle.dev` defaults.
  pub fn with_port_range(
    pods: P,
    servers: S,
    env_sets: E,
    keys: K,
    sandbox_runtime: impl Into<String>,
    deploy_keys: Arc<dyn git::DeployKeyRegistrar>,
    port_range: std::ops::RangeInclusive<u16>,
  ) -> Self {
    Self::with_base_domain(
      pods,
      servers,
      env_sets,
      keys,
      sandbox_runtime,
      deploy_keys,
      port_range,
      pinacle_client::entities::config::default_base_domain(),
    )
  }

  /// As [`Self::with_port_range`], additionally overriding the domain
  /// pods are published under (`CoreConfig.base_domain`).
  pub fn with_base_domain(
    pods: P,
    servers: S,
    env_sets: E,
    keys: K,
    sandbox_runtime: impl Into<String>,
    deploy_keys: Arc<dyn git::DeployKeyRegistrar>,
    port_range: std::ops::RangeInclusive<u16>,
    base_domain: impl Into<String>,
  ) -> Self {
    Self {
      pods,
      servers,
      env_sets,
      keys,
      sandbox_runtime: sandbox_runtime.into(),
      base_domain: base_domain.into(),
      ports: Arc::new(PortAllocator::with_range(port_range)),
      managers: DashMap::new(),
      deploy_keys,
      locks: PodLocks::new(),
    }
  }

  /// Resolves (and caches) the [`PodManager`] bound to one server's
  /// transport. Cheap to call repeatedly — only the first call for a
  /// given server pays for key resolution.
  async fn manager_for_server(&self, server: &ServerRecord) -> anyhow::Result<Arc<PodManager>> {
    if let Some(existing) = self.managers.get(&server.id) {
      return Ok(existing.clone());
    }
    let (host, port) = server
      .host_and_port()
      .ok_or_else(|| anyhow::anyhow!("server `{}` has a malformed address", server.id))?;
    let private_key = self.keys.resolve_private_key(&server.private_key_ref).await?;
    let transport = Arc::new(RemoteTransport::new(HostConfig {
      host: host.to_string(),
      port,
      user: server.ssh_user.clone(),
      private_key,
    }));
    let manager = Arc::new(PodManager::new(transport, self.sandbox_runtime.clone(), self.ports.clone()));
    self.managers.insert(server.id.clone(), manager.clone());
    Ok(manager)
  }

  async fn resolve_server(&self, server_id: Option<&str>) -> Result<ServerRecord, CoreError> {
    let server = match server_id {
      Some(id) => self.servers.get(id).await.map_err(CoreError::Other)?,
      None => self.servers.any_online().await.map_err(CoreError::Other)?,
    };
    let server = server.ok_or_else(|| {
      CoreError::HostUnavailable(match server_id {
        Some(id) => format!("server `{id}` not found"),
        None => "no server with capacity is online".to_string(),
      })
    })?;
    if !server.status.has_capacity() {
      return Err(CoreError::HostUnavailable(format!("server `{}` is not online", server.id)));
    }
    Ok(server)
  }

  async fn resolve_env_set(&self, env_set_id: Option<&str>) -> Result<HashMap<String, String>, CoreError> {
    let Some(env_set_id) = env_set_id else {
      return Ok(HashMap::new());
    };
    let record = self
      .env_sets
      .get(env_set_id)
      .await
      .map_err(CoreError::Other)?
      .ok_or_else(|| CoreError::ConfigInvalid(format!("environment set `{env_set_id}` not found")))?;
    Ok(pinacle_client::entities::dotenv::EnvironmentVar::parse_list(&record.variables).into_iter().collect())
  }

  /// `provisionPod({ podId, serverId?, githubRepoSetup?, hasPinacleYaml? },
  /// cleanupOnError=true)`: expands the pod's declarative config into a
  /// spec, interpolates its variables/secrets, and drives a fresh
  /// [`PodManager::create_pod`] through it. Persists the mutated
  /// [`PodRecord`] on success; on a fatal failure, runs `cleanupPod`
  /// first when `cleanup_on_error` is set.
  pub async fn provision_pod(&self, request: ProvisionRequest) -> Result<PodRecord, CoreError> {
    let _guard = self.locks.lock(&request.pod_id).await;

    let mut record = self
      .pods
      .load(&request.pod_id)
      .await
      .map_err(CoreError::Other)?
      .ok_or_else(|| CoreError::ConfigInvalid(format!("pod `{}` not found", request.pod_id)))?;

    let server = self.resolve_server(request.server_id.as_deref()).await?;
    record.server_id = Some(server.id.clone());
    record.status = PodStatus::Provisioning;
    self.pods.save(&record).await.map_err(CoreError::Other)?;

    let env_set = self.resolve_env_set(record.environment_set_id.as_deref()).await?;

    let github_repo_setup = request
      .github_repo_setup
      .map(|declared| -> Result<_, CoreError> {
        let key_pair = git::generate_ssh_key_pair(&request.pod_id).map_err(CoreError::Other)?;
        Ok((declared, key_pair))
      })
      .transpose()?;

    // Deploy-key registration, §2 EXPANSION: best-effort, only for fresh
    // repositories — an existing repo's key is expected to already be
    // authorized out of band.
    let mut deploy_key_id = None;
    if let Some((declared, key_pair)) = &github_repo_setup
      && declared.is_new()
    {
      deploy_key_id = git::try_register_deploy_key(
        self.deploy_keys.as_ref(),
        declared.repository(),
        &request.pod_id,
        &key_pair.public,
      )
      .await;
    }

    let inputs = ExpansionInputs {
      id: request.pod_id.clone(),
      name: record.name.clone(),
      slug: record.slug.clone(),
      env_set: env_set.clone(),
      github_repo_setup,
    };
    let mut spec = registry::expand::expand_spec(&record.config, inputs)?;
    if let Some(setup) = &mut spec.github_repo_setup {
      setup.deploy_key_id = deploy_key_id;
    }

    let mut interpolator = interpolate::Interpolator::new(None, &env_set);
    interpolator.interpolate_pod_spec(&mut spec).map_err(CoreError::Other)?;

    let has_repo = spec.github_repo_setup.is_some();
    let manager = self.manager_for_server(&server).await.map_err(CoreError::Other)?;
    let result = manager.create_pod(spec).await;

    match result {
      Ok(instance) => {
        // `createPod` mutates the spec's network fields internally; read
        // the manager's copy back rather than the pre-provisioning one.
        let final_spec = manager.get_pod_spec(&request.pod_id);
        if let Some(final_spec) = &final_spec {
          record.config = final_spec.to_declarative_config();
          record.internal_ip = final_spec.network.pod_ip.clone();
          record.ports = final_spec.network.ports.clone();
        }
        record.status = PodStatus::Running;
        record.container_id = Some(instance.container.id.clone());
        record.public_url = Some(PodRecord::public_url(&record.slug, &self.base_domain));
        record.last_started_at = Some(pinacle_client::entities::pinacle_timestamp());
        self.pods.save(&record).await.map_err(CoreError::Other)?;

        // Step 7: best-effort `.env` write into the cloned project's
        // working directory. Failure is logged, never fatal — the pod
        // has already reached `running`.
        if has_repo
          && let Some(dotenv) = self.raw_dotenv(record.environment_set_id.as_deref()).await
        {
          let pod_exec = PodExec { transport: manager.transport(), pod_id: request.pod_id.clone() };
          let env_path = format!("{}/.env", final_spec.as_ref().map(|s| s.working_dir.as_str()).unwrap_or("/workspace"));
          if let Err(e) = environment::write_env_file(&dotenv, &env_path, &pod_exec).await {
            tracing::warn!(pod_id = %request.pod_id, "failed to write .env file: {e:#}");
          }
        }

        Ok(record)
      }
      Err(err) => {
        record.status = PodStatus::Error;
        let _ = self.pods.save(&record).await;
        if request.cleanup_on_error && err.is_fatal_for_provision() {
          let _ = self.cleanup_pod_inner(&request.pod_id, &server.id).await;
        }
        Err(err)
      }
    }
  }

  /// Raw dotenv content for step 7's `.env` write: `None` unless the
  /// pod's env-set carries `rawContent` (variables-only env-sets are
  /// already folded into `spec.environment` by expansion and have
  /// nothing left to write as a file).
  async fn raw_dotenv(
    &self,
    env_set_id: Option<&str>,
  ) -> Option<pinacle_client::entities::dotenv::DotenvRecord> {
    let record = self.env_sets.get(env_set_id?).await.ok().flatten()?;
    record.raw_content.is_some().then_some(record)
  }

  /// `deprovisionPod({ podId })`: stops and removes the pod's container,
  /// services, network, and ports, then marks the record stopped. Per
  /// §4.1, "load record; if no host, return" — a pod that never made it
  /// past host assignment (or whose host was already cleared by a prior
  /// deprovision) has nothing remote to tear down, so this is a
  /// successful no-op rather than an error.
  pub async fn deprovision_pod(&self, pod_id: &str) -> Result<(), CoreError> {
    let _guard = self.locks.lock(pod_id).await;
    let mut record = self
      .pods
      .load(pod_id)
      .await
      .map_err(CoreError::Other)?
      .ok_or_else(|| CoreError::ConfigInvalid(format!("pod `{pod_id}` not found")))?;
    let Some(server_id) = record.server_id.clone() else {
      record.status = PodStatus::Stopped;
      record.last_stopped_at = Some(pinacle_client::entities::pinacle_timestamp());
      self.pods.save(&record).await.map_err(CoreError::Other)?;
      return Ok(());
    };
    let server = self
      .servers
      .get(&server_id)
      .await
      .map_err(CoreError::Other)?
      .ok_or_else(|| CoreError::HostUnavailable(format!("server `{server_id}` not found")))?;

    let manager = self.manager_for_server(&server).await.map_err(CoreError::Other)?;
    manager.delete_pod(pod_id).await?;

    record.status = PodStatus::Stopped;
    record.last_stopped_at = Some(pinacle_client::entities::pinacle_timestamp());
    record.container_id = None;
    self.pods.save(&record).await.map_err(CoreError::Other)?;
    Ok(())
  }

  /// `cleanupPod({ podId, serverId })`: reconciles in-memory state with
  /// the remote host without requiring a successful prior `createPod` —
  /// the path `provisionPod` takes on a fatal failure, and the one an
  /// operator takes to recover a pod this process lost track of.
  pub async fn cleanup_pod(&self, pod_id: &str, server_id: &str) -> Result<(), CoreError> {
    let _guard = self.locks.lock(pod_id).await;
    self.cleanup_pod_inner(pod_id, server_id).await
  }

  /// Shared by the public [`Self::cleanup_pod`] and `provisionPod`'s own
  /// failure path, which already holds the pod's lock and would
  /// deadlock re-acquiring it.
  async fn cleanup_pod_inner(&self, pod_id: &str, server_id: &str) -> Result<(), CoreError> {
    let server = self
      .servers
      .get(server_id)
      .await
      .map_err(CoreError::Other)?
      .ok_or_else(|| CoreError::HostUnavailable(format!("server `{server_id}` not found")))?;
    let manager = self.manager_for_server(&server).await.map_err(CoreError::Other)?;
    manager
      .cleanup_pod_by_container_id(&container_name(pod_id), RemoveOptions { remove_volumes: true })
      .await
      .map_err(CoreError::Other)
  }

  /// `getPodLogs(podId)`: the pod's container logs, fetched through its
  /// assigned server's transport.
  pub async fn get_pod_logs(&self, pod_id: &str) -> anyhow::Result<String> {
    let record = self
      .pods
      .load(pod_id)
      .await?
      .ok_or_else(|| anyhow::anyhow!("pod `{pod_id}` not found"))?;
    let server_id = record
      .server_id
      .ok_or_else(|| anyhow::anyhow!("pod `{pod_id}` has no assigned server"))?;
    let server = self
      .servers
      .get(&server_id)
      .await?
      .ok_or_else(|| anyhow::anyhow!("server `{server_id}` not found"))?;
    let manager = self.manager_for_server(&server).await?;
    manager.get_pod_logs(pod_id, None, false).await
  }

  /// `checkPodHealth(podId)`, used by the core's periodic health sweep:
  /// `false` covers both an unhealthy container and a pod this process
  /// cannot currently reach (no server, no record, unassigned).
  pub async fn check_pod_health(&self, pod_id: &str) -> bool {
    let Ok(Some(record)) = self.pods.load(pod_id).await else {
      return false;
    };
    let Some(server_id) = record.server_id else {
      return false;
    };
    let Ok(Some(server)) = self.servers.get(&server_id).await else {
      return false;
    };
    let Ok(manager) = self.manager_for_server(&server).await else {
      return false;
    };
    manager.check_pod_health(pod_id).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pinacle_client::entities::dotenv::DotenvRecord;
  use pinacle_client::entities::pod::DeclarativeConfig;
  use std::sync::Mutex;

  struct InMemoryPods(Mutex<HashMap<String, PodRecord>>);
  impl PodStore for InMemoryPods {
    async fn load(&self, pod_id: &str) -> anyhow::Result<Option<PodRecord>> {
      Ok(self.0.lock().unwrap().get(pod_id).cloned())
    }
    async fn save(&self, record: &PodRecord) -> anyhow::Result<()> {
      self.0.lock().unwrap().insert(record.id.clone(), record.clone());
      Ok(())
    }
  }

  struct NoServers;
  impl ServerStore for NoServers {
    async fn get(&self, _server_id: &str) -> anyhow::Result<Option<ServerRecord>> {
      Ok(None)
    }
    async fn any_online(&self) -> anyhow::Result<Option<ServerRecord>> {
      Ok(None)
    }
  }

  struct NoEnvSets;
  impl EnvSetStore for NoEnvSets {
    async fn get(&self, _env_set_id: &str) -> anyhow::Result<Option<DotenvRecord>> {
      Ok(None)
    }
  }

  struct NoKeys;
  impl KeyResolver for NoKeys {
    async fn resolve_private_key(&self, _key_ref: &str) -> anyhow::Result<String> {
      Ok(String::new())
    }
  }

  fn sample_record(pod_id: &str) -> PodRecord {
    PodRecord {
      id: pod_id.to_string(),
      slug: pod_id.to_string(),
      name: pod_id.to_string(),
      description: String::new(),
      owner: "owner1".to_string(),
      team: None,
      config: DeclarativeConfig {
        version: "1.0".to_string(),
        tier: "dev.small".to_string(),
        services: vec![],
        template: None,
        install: None,
        processes: vec![],
        tabs: vec![],
      },
      environment_set_id: None,
      source_repository: None,
      server_id: None,
      container_id: None,
      internal_ip: None,
      public_url: None,
      ports: vec![],
      status: PodStatus::Creating,
      created_at: 0,
      updated_at: 0,
      last_started_at: None,
      last_stopped_at: None,
      archived_at: None,
    }
  }

  fn orchestrator(
    pods: InMemoryPods,
  ) -> ProvisioningOrchestrator<InMemoryPods, NoServers, NoEnvSets, NoKeys> {
    ProvisioningOrchestrator::new(pods, NoServers, NoEnvSets, NoKeys, "runsc")
  }

  #[tokio::test]
  async fn provision_fails_fast_when_no_server_has_capacity() {
    let pod_id = "pod1";
    let pods = InMemoryPods(Mutex::new(HashMap::from([(pod_id.to_string(), sample_record(pod_id))])));
    let orchestrator = orchestrator(pods);
    let err = orchestrator.provision_pod(ProvisionRequest::new(pod_id)).await.unwrap_err();
    assert!(matches!(err, CoreError::HostUnavailable(_)));
  }

  #[tokio::test]
  async fn provision_of_unknown_pod_is_config_invalid() {
    let orchestrator = orchestrator(InMemoryPods(Mutex::new(HashMap::new())));
    let err = orchestrator.provision_pod(ProvisionRequest::new("ghost")).await.unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid(_)));
  }

  #[tokio::test]
  async fn deprovision_of_never_assigned_pod_is_a_successful_noop() {
    let pod_id = "pod1";
    let pods = InMemoryPods(Mutex::new(HashMap::from([(pod_id.to_string(), sample_record(pod_id))])));
    let orchestrator = orchestrator(pods);
    orchestrator.deprovision_pod(pod_id).await.unwrap();
    let record = orchestrator.pods.load(pod_id).await.unwrap().unwrap();
    assert_eq!(record.status, PodStatus::Stopped);
  }

  #[tokio::test]
  async fn deprovision_of_unknown_pod_is_still_config_invalid() {
    let orchestrator = orchestrator(InMemoryPods(Mutex::new(HashMap::new())));
    let err = orchestrator.deprovision_pod("ghost").await.unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid(_)));
  }
}
