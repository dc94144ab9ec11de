use anyhow::{Context, anyhow};
use mungos::{
  init::MongoBuilder,
  mongodb::{Collection, Database},
};
use pinacle_client::entities::{
  config::DatabaseConfig, dotenv::DotenvRecord, log::PodLogRecord,
  pod::PodRecord, server::ServerRecord,
};

pub use mongo_indexed;
pub use mungos;

/// Holds a handle to every collection the core reads and writes, per §6's
/// "persisted state read by the core": `pod`, `server`, `dotenv`, and
/// `pod_log`.
#[derive(Debug, Clone)]
pub struct Client {
  pub pods: Collection<PodRecord>,
  pub servers: Collection<ServerRecord>,
  pub dotenvs: Collection<DotenvRecord>,
  pub pod_logs: Collection<PodLogRecord>,
  pub db: Database,
}

impl Client {
  pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Client> {
    let db = init(config).await?;
    Self::from_database(db).await
  }

  pub async fn from_database(db: Database) -> anyhow::Result<Client> {
    let client = Client {
      pods: mongo_indexed::collection(&db, true).await?,
      servers: mongo_indexed::collection(&db, true).await?,
      dotenvs: mongo_indexed::collection(&db, true).await?,
      pod_logs: mongo_indexed::collection(&db, true).await?,
      db,
    };
    Ok(client)
  }
}

/// Initializes unindexed database handle.
pub async fn init(
  DatabaseConfig { uri, address, username, password, app_name, db_name }: &DatabaseConfig,
) -> anyhow::Result<Database> {
  let mut client = MongoBuilder::default().app_name(app_name);

  match (
    !uri.is_empty(),
    !address.is_empty(),
    !username.is_empty(),
    !password.is_empty(),
  ) {
    (true, _, _, _) => {
      client = client.uri(uri);
    }
    (_, true, true, true) => {
      client = client.address(address).username(username).password(password);
    }
    (_, true, _, _) => {
      client = client.address(address);
    }
    _ => {
      return Err(anyhow!(
        "'config.database' not configured correctly. must pass either 'config.database.uri', or 'config.database.address' + 'config.database.username' + 'config.database.password'"
      ));
    }
  }

  let client = client
    .build()
    .await
    .context("Failed to initialize database connection.")?;

  Ok(client.database(db_name))
}
