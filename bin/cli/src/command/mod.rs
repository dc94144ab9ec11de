use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use comfy_table::{Cell, Table};
use orchestrator::{ProvisionRequest, ProvisioningOrchestrator};
use pinacle_client::entities::pod::{DeclarativeConfig, PodRecord, PodStatus};

use crate::config::cli_config;
use crate::stores::MongoStore;

pub type Orchestrator = ProvisioningOrchestrator<MongoStore, MongoStore, MongoStore, MongoStore>;

pub async fn orchestrator() -> anyhow::Result<(database::Client, Orchestrator)> {
  let db = database::Client::new(&cli_config().database).await?;
  let store = MongoStore(db.clone());
  let deploy_keys: Arc<dyn git::DeployKeyRegistrar> =
    Arc::new(git::GithubDeployKeys::new(&cli_config().github_token));
  let orchestrator = ProvisioningOrchestrator::with_base_domain(
    store.clone(),
    store.clone(),
    store.clone(),
    store,
    cli_config().sandbox_runtime.clone(),
    deploy_keys,
    cli_config().port_range(),
    cli_config().base_domain.clone(),
  );
  Ok((db, orchestrator))
}

/// `pinacle provision --config <path>`: reads a local declarative config
/// file, persists a fresh pod record for it, and provisions it
/// immediately.
pub async fn provision(
  config_path: &PathBuf,
  name: &str,
  owner: &str,
  server_id: Option<String>,
  environment_set_id: Option<String>,
) -> anyhow::Result<()> {
  let raw = tokio::fs::read_to_string(config_path)
    .await
    .with_context(|| format!("failed to read {}", config_path.display()))?;
  let config = DeclarativeConfig::from_yaml(&raw)
    .with_context(|| format!("failed to parse {} as a declarative config", config_path.display()))?;

  let (db, orchestrator) = self::orchestrator().await?;
  let pod_id = uuid::Uuid::new_v4().to_string();
  let now = pinacle_client::entities::pinacle_timestamp();
  let record = PodRecord {
    id: pod_id.clone(),
    slug: pinacle_client::entities::to_slug(name),
    name: name.to_string(),
    description: String::new(),
    owner: owner.to_string(),
    team: None,
    config,
    environment_set_id,
    source_repository: None,
    server_id: None,
    container_id: None,
    internal_ip: None,
    public_url: None,
    ports: vec![],
    status: PodStatus::Creating,
    created_at: now,
    updated_at: now,
    last_started_at: None,
    last_stopped_at: None,
    archived_at: None,
  };
  db.pods
    .insert_one(&record)
    .await
    .context("failed to insert pod record")?;

  let mut request = ProvisionRequest::new(&pod_id);
  request.server_id = server_id;
  let record = orchestrator.provision_pod(request).await?;
  println!("pod {} ({}) provisioned: {}", record.slug, record.id, record.status);
  Ok(())
}

/// `pinacle stop <pod-id>`: tears the pod's container and network down
/// without forgetting the pod record.
pub async fn stop(pod_id: &str) -> anyhow::Result<()> {
  let (_db, orchestrator) = self::orchestrator().await?;
  orchestrator.deprovision_pod(pod_id).await?;
  println!("pod {pod_id} stopped");
  Ok(())
}

/// `pinacle delete <pod-id>`: stops the pod (best-effort) and removes
/// its record entirely.
pub async fn delete(pod_id: &str) -> anyhow::Result<()> {
  let (db, orchestrator) = self::orchestrator().await?;
  if let Err(e) = orchestrator.deprovision_pod(pod_id).await {
    tracing::warn!("pod {pod_id} did not stop cleanly, deleting record anyway | {e:#}");
  }
  db.pods
    .delete_one(database::mungos::mongodb::bson::doc! { "_id": pod_id })
    .await
    .context("failed to delete pod record")?;
  println!("pod {pod_id} deleted");
  Ok(())
}

/// `pinacle logs <pod-id>`: the pod's current container logs.
pub async fn logs(pod_id: &str) -> anyhow::Result<()> {
  let (_db, orchestrator) = self::orchestrator().await?;
  let logs = orchestrator.get_pod_logs(pod_id).await?;
  print!("{logs}");
  Ok(())
}

/// `pinacle status`: every non-archived pod in a table.
pub async fn status() -> anyhow::Result<()> {
  let (db, _orchestrator) = self::orchestrator().await?;
  let pods = database::mungos::find::find_collect(
    &db.pods,
    database::mungos::mongodb::bson::doc! { "archived_at": { "$exists": false } },
    None,
  )
  .await
  .context("failed to list pods")?;

  let mut table = Table::new();
  table.set_header(vec!["ID", "SLUG", "STATUS", "SERVER", "INTERNAL IP", "PUBLIC URL"]);
  for pod in pods {
    table.add_row(vec![
      Cell::new(&pod.id),
      Cell::new(&pod.slug),
      Cell::new(pod.status.to_string()),
      Cell::new(pod.server_id.as_deref().unwrap_or("-")),
      Cell::new(pod.internal_ip.as_deref().unwrap_or("-")),
      Cell::new(pod.public_url.as_deref().unwrap_or("-")),
    ]);
  }
  println!("{table}");
  Ok(())
}
