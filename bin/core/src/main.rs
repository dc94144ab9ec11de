#[macro_use]
extern crate tracing;

use std::sync::Arc;

use orchestrator::ProvisioningOrchestrator;

use crate::config::core_config;
use crate::stores::MongoStore;

mod config;
mod loops;
mod stores;

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = core_config();
  logger::init(&config.logging)?;

  info!("Pinacle Core version: v{}", env!("CARGO_PKG_VERSION"));
  if config.pretty_startup_config {
    info!("{:#?}", config.sanitized());
  } else {
    info!("{:?}", config.sanitized());
  }

  let db = database::Client::new(&config.database).await?;
  let store = MongoStore(db.clone());
  let deploy_keys: Arc<dyn git::DeployKeyRegistrar> =
    Arc::new(git::GithubDeployKeys::new(&config.github_token));
  let orchestrator = Arc::new(ProvisioningOrchestrator::with_base_domain(
    store.clone(),
    store.clone(),
    store.clone(),
    store,
    config.sandbox_runtime.clone(),
    deploy_keys,
    config.port_range(),
    config.base_domain.clone(),
  ));

  loops::spawn_provision_loop(db.clone(), orchestrator.clone());
  loops::spawn_health_loop(db, orchestrator);

  info!("Pinacle Core is running");
  std::future::pending::<()>().await;
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mut term_signal =
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
  tokio::select! {
    res = tokio::spawn(app()) => res?,
    _ = term_signal.recv() => Ok(()),
  }
}
