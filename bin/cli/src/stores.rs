//! Implements `orchestrator`'s repository traits over [`database::Client`],
//! same shape as `bin/core`'s — the CLI talks to the same database and
//! hosts directly rather than through the core process.

use anyhow::Context;
use database::mungos::mongodb::{bson::doc, options::ReplaceOptions};
use orchestrator::{EnvSetStore, KeyResolver, PodStore, ServerStore};
use pinacle_client::entities::{
  dotenv::DotenvRecord, pod::PodRecord, server::ServerRecord,
};

use crate::config::cli_config;

#[derive(Clone)]
pub struct MongoStore(pub database::Client);

impl PodStore for MongoStore {
  async fn load(&self, pod_id: &str) -> anyhow::Result<Option<PodRecord>> {
    self
      .0
      .pods
      .find_one(doc! { "_id": pod_id })
      .await
      .context("failed to query mongo for pod")
  }

  async fn save(&self, record: &PodRecord) -> anyhow::Result<()> {
    self
      .0
      .pods
      .replace_one(
        doc! { "_id": &record.id },
        record,
        ReplaceOptions::builder().upsert(true).build(),
      )
      .await
      .context("failed to save pod to mongo")?;
    Ok(())
  }
}

impl ServerStore for MongoStore {
  async fn get(&self, server_id: &str) -> anyhow::Result<Option<ServerRecord>> {
    self
      .0
      .servers
      .find_one(doc! { "_id": server_id })
      .await
      .context("failed to query mongo for server")
  }

  async fn any_online(&self) -> anyhow::Result<Option<ServerRecord>> {
    self
      .0
      .servers
      .find_one(doc! { "status": "online" })
      .await
      .context("failed to query mongo for an online server")
  }
}

impl EnvSetStore for MongoStore {
  async fn get(&self, env_set_id: &str) -> anyhow::Result<Option<DotenvRecord>> {
    self
      .0
      .dotenvs
      .find_one(doc! { "_id": env_set_id })
      .await
      .context("failed to query mongo for environment set")
  }
}

impl KeyResolver for MongoStore {
  async fn resolve_private_key(&self, _key_ref: &str) -> anyhow::Result<String> {
    tokio::fs::read_to_string(&cli_config().ssh_private_key_path)
      .await
      .with_context(|| {
        format!(
          "failed to read ssh private key from {}",
          cli_config().ssh_private_key_path.display()
        )
      })
  }
}
