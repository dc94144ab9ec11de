//! Pod Manager, §4.2: an in-process, ephemeral state machine driving one
//! host's containers, networks, services, and user processes through a
//! single remote transport. Nothing here is persisted — the
//! Provisioning Orchestrator owns translating this crate's results back
//! into a [`pinacle_client::entities::pod::PodRecord`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use container_runtime::{ContainerRuntime, RemoveOptions};
use dashmap::DashMap;
use network::{NetworkManager, PortAllocator};
use pinacle_client::entities::docker::{ContainerInfo, ExecOutput, container_name};
use pinacle_client::entities::error::CoreError;
use pinacle_client::entities::event::{PodEvent, PodEventKind};
use pinacle_client::entities::log::PodLogRecord;
use pinacle_client::entities::spec::{PodSpec, ServiceSpec};
use tokio::sync::broadcast;
use transport::{PodExec, RemoteTransport};

/// Per-pod in-process lifecycle state. `Failed` is terminal except by an
/// explicit retry through a new `createPod` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodState {
  Pending,
  Provisioning,
  Starting,
  Running,
  Stopping,
  Stopped,
  Terminating,
  Deleted,
  Failed,
}

struct PodRuntime {
  state: PodState,
  spec: PodSpec,
}

/// Output of a successful `createPod` / `startPod`: everything the
/// caller needs to persist back into the pod record.
pub struct PodInstance {
  pub container: ContainerInfo,
  pub logs: Vec<PodLogRecord>,
}

/// Steps completed so far in `createPod`, tracked so a later failure can
/// be unwound in reverse order.
enum CompletedStep {
  NetworkCreated,
  ProxyPortAllocated(u16),
  ContainerCreated,
  ContainerStarted,
}

/// Owns the remote transport and the process-wide port table behind
/// `Arc`s rather than borrowing them, so one process can hold a
/// `PodManager` per host without fighting a borrowed lifetime through
/// every async fn. `ContainerRuntime`/`NetworkManager` are themselves
/// cheap, borrow-only views, so each operation just builds a fresh one.
pub struct PodManager {
  transport: Arc<RemoteTransport>,
  sandbox_runtime: String,
  ports: Arc<PortAllocator>,
  pods: DashMap<String, PodRuntime>,
  events: broadcast::Sender<PodEvent>,
}

impl PodManager {
  pub fn new(
    transport: Arc<RemoteTransport>,
    sandbox_runtime: impl Into<String>,
    ports: Arc<PortAllocator>,
  ) -> Self {
    let (events, _) = broadcast::channel(256);
    Self {
      transport,
      sandbox_runtime: sandbox_runtime.into(),
      ports,
      pods: DashMap::new(),
      events,
    }
  }

  fn runtime(&self) -> ContainerRuntime<'_> {
    ContainerRuntime::new(&self.transport, self.sandbox_runtime.clone())
  }

  fn network(&self) -> NetworkManager<'_> {
    NetworkManager::new(&self.transport, &self.ports)
  }

  /// The remote transport backing this manager's server, for callers
  /// outside the Pod Manager that need to run a one-off command against
  /// a pod's container (e.g. writing its `.env` file after create_pod
  /// returns).
  pub fn transport(&self) -> &RemoteTransport {
    self.transport.as_ref()
  }

  pub fn subscribe(&self) -> broadcast::Receiver<PodEvent> {
    self.events.subscribe()
  }

  fn emit(&self, pod_id: &str, kind: PodEventKind) {
    // Event loss is acceptable: a full/unsubscribed channel drops this
    // silently, per §4.2.
    let _ = self.events.send(PodEvent::new(pod_id, kind));
  }

  fn set_state(&self, pod_id: &str, state: PodState) {
    if let Some(mut entry) = self.pods.get_mut(pod_id) {
      entry.state = state;
    }
  }

  fn pod_exec(&self, pod_id: &str) -> PodExec<'_> {
    PodExec { transport: &self.transport, pod_id: pod_id.to_string() }
  }

  /// `createPod(spec) → PodInstance`. Spec is taken by value since
  /// expansion's network/service fields are filled in as the pipeline
  /// runs and the caller needs the mutated copy back to persist.
  pub async fn create_pod(&self, mut spec: PodSpec) -> Result<PodInstance, CoreError> {
    self.pods.insert(
      spec.id.clone(),
      PodRuntime { state: PodState::Pending, spec: spec.clone() },
    );
    self.set_state(&spec.id, PodState::Provisioning);

    validate_spec(&spec)?;

    let mut completed = Vec::new();
    let result = self.create_pod_pipeline(&mut spec, &mut completed).await;

    match result {
      Ok(logs) => {
        if let Some(mut entry) = self.pods.get_mut(&spec.id) {
          entry.state = PodState::Running;
          entry.spec = spec.clone();
        }
        self.emit(&spec.id, PodEventKind::Started);
        let container = self.runtime()
          .get_container(&container_name(&spec.id))
          .await
          .map_err(CoreError::Other)?
          .ok_or_else(|| {
            CoreError::Other(anyhow::anyhow!("container vanished right after create"))
          })?;
        Ok(PodInstance { container, logs })
      }
      Err(err) => {
        self.rollback(&spec, &completed).await;
        self.set_state(&spec.id, PodState::Failed);
        self.emit(&spec.id, PodEventKind::Failed { error: err.to_string() });
        Err(err)
      }
    }
  }

  async fn create_pod_pipeline(
    &self,
    spec: &mut PodSpec,
    completed: &mut Vec<CompletedStep>,
  ) -> Result<Vec<PodLogRecord>, CoreError> {
    let mut logs = Vec::new();

    // 2. Create pod network.
    let subnet = self.network()
      .create_pod_network(&spec.id)
      .await
      .map_err(|e| CoreError::NetworkAllocationExhausted(e.to_string()))?;
    completed.push(CompletedStep::NetworkCreated);
    spec.network.subnet = Some(subnet.cidr.clone());
    spec.network.pod_ip = Some(subnet.pod_ip.clone());
    spec.network.gateway_ip = Some(subnet.gateway_ip.clone());

    // 3. Allocate the reverse-proxy port.
    let proxy_port = self.network()
      .allocate_reverse_proxy_port(&spec.id)
      .await
      .map_err(|e| CoreError::NetworkAllocationExhausted(e.to_string()))?;
    completed.push(CompletedStep::ProxyPortAllocated(
      proxy_port.external.unwrap_or_default(),
    ));
    spec.network.ports.push(proxy_port);

    // 4. Create container.
    self.runtime()
      .create_container(spec)
      .await
      .map_err(|e| CoreError::ContainerCreateFailed(e.to_string()))?;
    completed.push(CompletedStep::ContainerCreated);

    // 5. Start container.
    let container_id = container_name(&spec.id);
    self.runtime()
      .start_container(&container_id)
      .await
      .map_err(|e| CoreError::ContainerStartFailed(e.to_string()))?;
    completed.push(CompletedStep::ContainerStarted);

    // Containers are created on the default `bridge` network (the
    // `docker create` invocation fixes `--network bridge`); the pod's
    // own network is attached here, after start, so creation never races
    // a network that provisioning might still roll back.
    self.network()
      .connect_container(&spec.id, &container_id, &subnet.pod_ip)
      .await
      .map_err(|e| CoreError::ContainerStartFailed(e.to_string()))?;

    self.network()
      .apply_network_policy(&spec.id, &spec.network)
      .await
      .ok(); // best-effort, per §4.4.

    // 6. Repository setup.
    let pod_exec = self.pod_exec(&spec.id);
    logs.extend(self.run_repo_setup(spec, &pod_exec).await?);

    // 7-8. Provision and start built-in services, in dependency order.
    for service in topological_services(&spec.services)? {
      let result = service_provisioner::provision_service(&pod_exec, &spec.id, spec, &service)
        .await
        .map_err(|e| CoreError::ServiceProvisionFailed {
          service: service.name.clone(),
          reason: e.to_string(),
        })?;
      logs.extend(result.logs);

      self.start_service_and_verify_healthy(&pod_exec, spec, &service, &mut logs).await?;
    }

    // 9. Run user install command.
    let is_existing = spec.is_existing_repo();
    let install_result =
      process_provisioner::run_install(&pod_exec, &spec.id, spec, is_existing)
        .await
        .map_err(|e| CoreError::InstallFailed(e.to_string()))?;
    logs.extend(install_result.logs);

    // 10. Provision and start user processes.
    for process in spec.processes.clone() {
      let result = process_provisioner::provision_process(&pod_exec, &spec.id, spec, &process)
        .await
        .map_err(|e| CoreError::ProcessStartFailed {
          process: process.config.name.clone(),
          reason: e.to_string(),
        })?;
      logs.extend(result.logs);
    }

    Ok(logs)
  }

  /// Starts a service, then waits for it to report healthy per its
  /// registry-configured start delay and retry count (§4.5). A service
  /// whose `supervisorctl start` succeeds but never becomes healthy fails
  /// the same way a provisioning or install step does, rather than
  /// silently reporting the pod as started.
  async fn start_service_and_verify_healthy(
    &self,
    pod_exec: &PodExec<'_>,
    spec: &PodSpec,
    service: &ServiceSpec,
    logs: &mut Vec<PodLogRecord>,
  ) -> Result<(), CoreError> {
    let result = service_provisioner::start_service(pod_exec, &spec.id, &service.name)
      .await
      .map_err(|e| CoreError::ServiceStartFailed {
        service: service.name.clone(),
        reason: e.to_string(),
      })?;
    logs.extend(result.logs);

    let definition = registry::services::entry(&service.name)
      .map(|e| e.definition)
      .ok_or_else(|| CoreError::ConfigInvalid(format!("unknown service `{}`", service.name)))?;

    let healthy = service_provisioner::wait_for_service_healthy(
      pod_exec,
      spec,
      service,
      Duration::from_secs(definition.start_delay_secs),
      definition.health_retries,
      service_provisioner::DEFAULT_RETRY_INTERVAL,
    )
    .await
    .map_err(|e| CoreError::ServiceStartFailed {
      service: service.name.clone(),
      reason: e.to_string(),
    })?;
    if !healthy {
      return Err(CoreError::ServiceStartFailed {
        service: service.name.clone(),
        reason: "service did not become healthy after start".to_string(),
      });
    }
    Ok(())
  }

  async fn run_repo_setup(
    &self,
    spec: &PodSpec,
    pod_exec: &PodExec<'_>,
  ) -> Result<Vec<PodLogRecord>, CoreError> {
    let Some(setup) = &spec.github_repo_setup else {
      return Ok(Vec::new());
    };
    let repo = setup.declared.repository();
    let branch = setup.declared.branch();

    let git_res = if setup.declared.is_new() {
      let template_id = spec.template.as_deref().ok_or_else(|| {
        CoreError::ConfigInvalid("new repo setup requires a template".to_string())
      })?;
      let template = registry::templates::template(template_id).ok_or_else(|| {
        CoreError::ConfigInvalid(format!("unknown template `{template_id}`"))
      })?;
      git::initialize_template(
        &spec.id,
        &template.init_script,
        repo,
        &setup.ssh_key_pair,
        pod_exec,
      )
      .await
    } else {
      git::clone_repository(&spec.id, repo, branch, &setup.ssh_key_pair, pod_exec).await
    }
    .map_err(CoreError::Other)?;

    let mut logs = git_res.logs;
    let config = spec.to_declarative_config();
    let inject_res = git::inject_pinacle_config(&spec.id, &config, pod_exec)
      .await
      .map_err(CoreError::Other)?;
    logs.extend(inject_res.logs);
    Ok(logs)
  }

  async fn rollback(&self, spec: &PodSpec, completed: &[CompletedStep]) {
    for step in completed.iter().rev() {
      match step {
        CompletedStep::ContainerStarted | CompletedStep::ContainerCreated => {
          let _ = self.runtime()
            .remove_container(&container_name(&spec.id), RemoveOptions { remove_volumes: false })
            .await;
        }
        CompletedStep::ProxyPortAllocated(port) => {
          self.network().release_port(&spec.id, *port);
        }
        CompletedStep::NetworkCreated => {
          let _ = self.network().destroy_pod_network(&spec.id).await;
        }
      }
    }
  }

  /// `startPod(podId)`: re-starts the container, then re-starts every
  /// service and user process. Requires a spec from a prior `createPod`.
  pub async fn start_pod(&self, pod_id: &str) -> Result<PodInstance, CoreError> {
    let spec = self
      .pods
      .get(pod_id)
      .map(|entry| entry.spec.clone())
      .ok_or_else(|| CoreError::Other(anyhow::anyhow!("pod `{pod_id}` is not known to this manager")))?;

    self.set_state(pod_id, PodState::Starting);
    let container_id = container_name(pod_id);
    self.runtime()
      .start_container(&container_id)
      .await
      .map_err(|e| CoreError::ContainerStartFailed(e.to_string()))?;

    let pod_exec = self.pod_exec(pod_id);
    let mut logs = Vec::new();
    for service in topological_services(&spec.services)? {
      self.start_service_and_verify_healthy(&pod_exec, &spec, &service, &mut logs).await?;
    }
    for process in &spec.processes {
      let result = process_provisioner::start_process(&pod_exec, pod_id, &spec, process)
        .await
        .map_err(|e| CoreError::ProcessStartFailed {
          process: process.config.name.clone(),
          reason: e.to_string(),
        })?;
      logs.extend(result.logs);
    }

    self.set_state(pod_id, PodState::Running);
    self.emit(pod_id, PodEventKind::Started);
    let container = self.runtime()
      .get_container(&container_id)
      .await
      .map_err(CoreError::Other)?
      .ok_or_else(|| CoreError::Other(anyhow::anyhow!("container vanished after start")))?;
    Ok(PodInstance { container, logs })
  }

  /// `stopPod(podId)`: stops services in reverse dependency order, then
  /// the container.
  pub async fn stop_pod(&self, pod_id: &str) -> Result<(), CoreError> {
    let spec = self
      .pods
      .get(pod_id)
      .map(|entry| entry.spec.clone())
      .ok_or_else(|| CoreError::Other(anyhow::anyhow!("pod `{pod_id}` is not known to this manager")))?;

    self.set_state(pod_id, PodState::Stopping);
    let pod_exec = self.pod_exec(pod_id);

    for process in &spec.processes {
      process_provisioner::stop_process(&pod_exec, pod_id, &spec.working_dir, process).await;
    }
    let mut ordered = topological_services(&spec.services)?;
    ordered.reverse();
    for service in ordered {
      service_provisioner::stop_service(&pod_exec, pod_id, &service.name).await;
    }

    self.runtime()
      .stop_container(&container_name(pod_id))
      .await
      .map_err(CoreError::Other)?;

    self.set_state(pod_id, PodState::Stopped);
    self.emit(pod_id, PodEventKind::Stopped);
    Ok(())
  }

  /// `deletePod(podId)`: stop first if running, remove services,
  /// container, port forwarding, network; release ports; drop the
  /// in-memory record.
  pub async fn delete_pod(&self, pod_id: &str) -> Result<(), CoreError> {
    self.set_state(pod_id, PodState::Terminating);
    let _ = self.stop_pod(pod_id).await;

    if let Some(entry) = self.pods.get(pod_id) {
      let pod_exec = self.pod_exec(pod_id);
      for service in &entry.spec.services {
        service_provisioner::remove_service(&pod_exec, pod_id, &service.name).await;
      }
    }

    self.runtime()
      .remove_container(&container_name(pod_id), RemoveOptions { remove_volumes: true })
      .await
      .map_err(CoreError::Other)?;
    self.network().release_all_ports(pod_id);
    self.network()
      .destroy_pod_network(pod_id)
      .await
      .map_err(CoreError::Other)?;

    self.pods.remove(pod_id);
    self.emit(pod_id, PodEventKind::Deleted);
    Ok(())
  }

  /// `execInPod(podId, argv) → { stdout, stderr, exitCode }`.
  pub async fn exec_in_pod(
    &self,
    pod_id: &str,
    argv: &[&str],
  ) -> anyhow::Result<ExecOutput> {
    self.runtime()
      .exec_in_container(&container_name(pod_id), argv)
      .await
  }

  /// `getPodLogs(podId, { tail?, follow? })`.
  pub async fn get_pod_logs(
    &self,
    pod_id: &str,
    tail: Option<u32>,
    follow: bool,
  ) -> anyhow::Result<String> {
    self.runtime()
      .get_container_logs(&container_name(pod_id), tail, follow)
      .await
  }

  /// `checkPodHealth(podId)`: running container + every enabled service +
  /// every user process healthy. Never throws; any failure to even reach
  /// the container counts as unhealthy. Process checks are single-shot
  /// (no retry loop) — this is a point-in-time read, not a provisioning
  /// wait.
  pub async fn check_pod_health(&self, pod_id: &str) -> bool {
    let Some(spec) = self.pods.get(pod_id).map(|e| e.spec.clone()) else {
      return false;
    };
    let Ok(Some(container)) = self.runtime().get_container(&container_name(pod_id)).await else {
      return false;
    };
    if !container.status.is_running() {
      return false;
    }
    let pod_exec = self.pod_exec(pod_id);
    let is_existing = spec.is_existing_repo();
    for service in &spec.services {
      match service_provisioner::check_service_health(&pod_exec, &spec, service).await {
        Ok(true) => {}
        _ => {
          self.emit(pod_id, PodEventKind::HealthCheck { healthy: false });
          return false;
        }
      }
    }
    for process in &spec.processes {
      match process_provisioner::check_process_health(
        &pod_exec,
        &spec.working_dir,
        process,
        is_existing,
        Duration::ZERO,
      )
      .await
      {
        Ok(true) => {}
        _ => {
          self.emit(pod_id, PodEventKind::HealthCheck { healthy: false });
          return false;
        }
      }
    }
    self.emit(pod_id, PodEventKind::HealthCheck { healthy: true });
    true
  }

  /// Returns the manager's current copy of a pod's spec, as mutated by
  /// `createPod`'s network/service expansion — the orchestrator reads
  /// this back to persist the declarative config's side effects (the
  /// allocated subnet, reverse-proxy port) without `createPod` itself
  /// having to carry the whole spec back through its return type.
  pub fn get_pod_spec(&self, pod_id: &str) -> Option<PodSpec> {
    self.pods.get(pod_id).map(|entry| entry.spec.clone())
  }

  /// `getPodContainer() → ContainerInfo | null`.
  pub async fn get_pod_container(
    &self,
    pod_id: &str,
  ) -> anyhow::Result<Option<ContainerInfo>> {
    self.runtime().get_container(&container_name(pod_id)).await
  }

  /// `getActiveContainerForPodOrThrow()`.
  pub async fn get_active_container_for_pod_or_throw(
    &self,
    pod_id: &str,
  ) -> anyhow::Result<ContainerInfo> {
    self
      .get_pod_container(pod_id)
      .await?
      .filter(|c| c.status.is_running())
      .ok_or_else(|| anyhow::anyhow!("pod `{pod_id}` has no running container"))
  }

  /// `cleanupPod()`: drops every pod this manager still remembers whose
  /// container is actually gone, reconciling in-memory state with the
  /// remote host after a crash/restart.
  pub async fn cleanup_pod(&self) {
    let pod_ids: Vec<String> = self.pods.iter().map(|e| e.key().clone()).collect();
    for pod_id in pod_ids {
      if matches!(self.get_pod_container(&pod_id).await, Ok(None)) {
        self.pods.remove(&pod_id);
      }
    }
  }

  /// `cleanupPodByContainerId(id, { removeVolumes })`: recovers the pod
  /// id from the container's name and tears it down without requiring an
  /// in-memory record — used by the orchestrator's failure path, which
  /// may be cleaning up a pod this process never successfully tracked.
  pub async fn cleanup_pod_by_container_id(
    &self,
    container_id: &str,
    opts: RemoveOptions,
  ) -> anyhow::Result<()> {
    if let Some(pod_id) =
      pinacle_client::entities::docker::pod_id_from_container_name(container_id)
    {
      self.network().release_all_ports(pod_id);
      let _ = self.network().destroy_pod_network(pod_id).await;
      self.pods.remove(pod_id);
    }
    self.runtime().remove_container(container_id, opts).await
  }
}

fn validate_spec(spec: &PodSpec) -> Result<(), CoreError> {
  if registry::tiers::tier(&spec.tier).is_none() {
    return Err(CoreError::ConfigInvalid(format!("unknown tier `{}`", spec.tier)));
  }
  for service in &spec.services {
    if registry::services::entry(&service.name).is_none() {
      return Err(CoreError::ConfigInvalid(format!(
        "unknown service `{}`",
        service.name
      )));
    }
  }
  let mut seen: Vec<(u16, pinacle_client::entities::docker::PortProtocol)> = Vec::new();
  for port in &spec.network.ports {
    let key = (port.internal, port.protocol);
    if seen.contains(&key) {
      return Err(CoreError::ConfigInvalid(format!(
        "duplicate internal port {} ({:?})",
        port.internal, port.protocol
      )));
    }
    seen.push(key);
  }
  Ok(())
}

/// Orders services so that every entry appears after everything it
/// `depends_on`, per §4.2's "provision in dependency order (topological
/// over `dependsOn`)". A cycle is a config error, not a panic.
fn topological_services(services: &[ServiceSpec]) -> Result<Vec<ServiceSpec>, CoreError> {
  let by_name: HashMap<&str, &ServiceSpec> =
    services.iter().map(|s| (s.name.as_str(), s)).collect();
  let mut in_degree: HashMap<&str, usize> =
    services.iter().map(|s| (s.name.as_str(), 0)).collect();
  for service in services {
    for dep in &service.depends_on {
      if by_name.contains_key(dep.as_str()) {
        *in_degree.get_mut(service.name.as_str()).unwrap() += 1;
      }
    }
  }

  let mut queue: VecDeque<&str> = in_degree
    .iter()
    .filter(|(_, &deg)| deg == 0)
    .map(|(&name, _)| name)
    .collect();
  let mut ordered = Vec::with_capacity(services.len());

  while let Some(name) = queue.pop_front() {
    ordered.push(by_name[name].clone());
    for service in services {
      if service.depends_on.iter().any(|d| d == name) {
        let degree = in_degree.get_mut(service.name.as_str()).unwrap();
        *degree -= 1;
        if *degree == 0 {
          queue.push_back(service.name.as_str());
        }
      }
    }
  }

  if ordered.len() != services.len() {
    return Err(CoreError::ConfigInvalid(
      "service dependency graph has a cycle".to_string(),
    ));
  }
  Ok(ordered)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap as Map;

  fn service(name: &str, depends_on: &[&str]) -> ServiceSpec {
    ServiceSpec {
      name: name.to_string(),
      ports: vec![],
      environment: Map::new(),
      auto_restart: true,
      depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
    }
  }

  #[test]
  fn orders_dependent_service_after_its_dependency() {
    let services = vec![service("claude-code", &["web-terminal"]), service("web-terminal", &[])];
    let ordered = topological_services(&services).unwrap();
    let positions: Map<&str, usize> =
      ordered.iter().enumerate().map(|(i, s)| (s.name.as_str(), i)).collect();
    assert!(positions["web-terminal"] < positions["claude-code"]);
  }

  #[test]
  fn detects_a_dependency_cycle() {
    let services = vec![service("a", &["b"]), service("b", &["a"])];
    assert!(topological_services(&services).is_err());
  }

  #[test]
  fn validate_spec_rejects_duplicate_internal_ports() {
    use pinacle_client::entities::docker::{PortMapping, PortProtocol};
    use pinacle_client::entities::spec::{NetworkSpec, ResourceSpec};
    let spec = PodSpec {
      id: "pod1".to_string(),
      name: "app".to_string(),
      slug: "app".to_string(),
      base_image: "pinacle/base:latest".to_string(),
      template: None,
      resources: ResourceSpec { cpu_cores: 1.0, memory_mb: 1024, storage_mb: 10240 },
      network: NetworkSpec {
        ports: vec![
          PortMapping { name: "a".to_string(), internal: 80, external: None, protocol: PortProtocol::Tcp, public: false, subdomain: None },
          PortMapping { name: "b".to_string(), internal: 80, external: None, protocol: PortProtocol::Tcp, public: false, subdomain: None },
        ],
        ..Default::default()
      },
      services: vec![],
      install_command: None,
      processes: vec![],
      environment: Map::new(),
      github_repo: None,
      github_branch: None,
      github_repo_setup: None,
      working_dir: PodSpec::DEFAULT_WORKING_DIR.to_string(),
      user: PodSpec::DEFAULT_USER.to_string(),
      tabs: vec![],
      tier: "dev.small".to_string(),
    };
    assert!(validate_spec(&spec).is_err());
  }
}
