//! Background loops the core runs instead of serving an HTTP/RPC api:
//! a provisioning-queue poll and a periodic health sweep over pods it
//! believes are running, mirroring the `wait_until_timelength` +
//! `tokio::join!` shape the rest of this lineage uses for its own
//! background work.

use std::sync::Arc;

use async_timing_util::{Timelength, wait_until_timelength};
use database::mungos::{
  find::find_collect,
  mongodb::{bson::doc, options::ReplaceOptions},
};
use futures::{StreamExt, stream};
use orchestrator::{ProvisionRequest, ProvisioningOrchestrator};
use pinacle_client::entities::pod::PodStatus;
use tracing::{error, info, warn};

use crate::config::core_config;
use crate::stores::MongoStore;

/// Polls for pods stuck in `creating` and drives each one through
/// [`ProvisioningOrchestrator::provision_pod`], bounded to
/// `worker_pool_size` concurrent provisions.
pub fn spawn_provision_loop(
  db: database::Client,
  orchestrator: Arc<ProvisioningOrchestrator<MongoStore, MongoStore, MongoStore, MongoStore>>,
) {
  tokio::spawn(async move {
    loop {
      wait_until_timelength(Timelength::FifteenSeconds, 0).await;
      if let Err(e) = run_provision_pass(&db, &orchestrator).await {
        error!("error in provisioning pass | {e:#}");
      }
    }
  });
}

async fn run_provision_pass(
  db: &database::Client,
  orchestrator: &ProvisioningOrchestrator<MongoStore, MongoStore, MongoStore, MongoStore>,
) -> anyhow::Result<()> {
  let pending = find_collect(&db.pods, doc! { "status": "creating" }, None).await?;
  if pending.is_empty() {
    return Ok(());
  }
  info!("provisioning {} pending pod(s)", pending.len());

  let worker_pool_size = core_config().worker_pool_size.max(1);
  stream::iter(pending)
    .map(|record| async move {
      let pod_id = record.id.clone();
      let result = orchestrator.provision_pod(ProvisionRequest::new(&pod_id)).await;
      (pod_id, result)
    })
    .buffer_unordered(worker_pool_size)
    .for_each(|(pod_id, result)| async move {
      if let Err(e) = result {
        error!("failed to provision pod {pod_id} | {e:#}");
      }
    })
    .await;

  Ok(())
}

/// Periodically checks every pod this process believes is `running`,
/// flipping it to `error` if it no longer responds.
pub fn spawn_health_loop(
  db: database::Client,
  orchestrator: Arc<ProvisioningOrchestrator<MongoStore, MongoStore, MongoStore, MongoStore>>,
) {
  tokio::spawn(async move {
    loop {
      wait_until_timelength(Timelength::OneMinute, 15000).await;
      if let Err(e) = run_health_pass(&db, &orchestrator).await {
        error!("error in health sweep | {e:#}");
      }
    }
  });
}

async fn run_health_pass(
  db: &database::Client,
  orchestrator: &ProvisioningOrchestrator<MongoStore, MongoStore, MongoStore, MongoStore>,
) -> anyhow::Result<()> {
  let running = find_collect(&db.pods, doc! { "status": "running" }, None).await?;

  stream::iter(running)
    .for_each_concurrent(core_config().worker_pool_size.max(1), |mut record| {
      let db = db.clone();
      async move {
        let healthy = orchestrator.check_pod_health(&record.id).await;
        if healthy {
          return;
        }
        warn!("pod {} failed its health check, marking errored", record.id);
        record.status = PodStatus::Error;
        if let Err(e) = db
          .pods
          .replace_one(
            doc! { "_id": &record.id },
            &record,
            ReplaceOptions::builder().upsert(false).build(),
          )
          .await
        {
          error!("failed to mark pod {} errored | {e:#}", record.id);
        }
      }
    })
    .await;

  Ok(())
}
