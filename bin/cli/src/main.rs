#[macro_use]
extern crate tracing;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::cli_config;

mod command;
mod config;
mod stores;

#[derive(Parser)]
#[command(name = "pinacle", version, about = "Operate the Pinacle orchestration core directly")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Provision a new pod from a local declarative config file.
  Provision {
    /// Path to the pod's declarative config YAML.
    #[arg(long)]
    config: PathBuf,
    /// Pod display name.
    #[arg(long)]
    name: String,
    /// Owning user or team.
    #[arg(long)]
    owner: String,
    /// Pin the pod to a specific server id instead of picking any online one.
    #[arg(long)]
    server: Option<String>,
    /// Environment set id to attach.
    #[arg(long)]
    env_set: Option<String>,
  },
  /// Stop a running pod, keeping its record for a future re-provision.
  Stop {
    pod_id: String,
  },
  /// Stop and permanently delete a pod's record.
  Delete {
    pod_id: String,
  },
  /// Print the pod's current container logs.
  Logs {
    pod_id: String,
  },
  /// List every pod and its current status.
  Status,
}

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  logger::init(&cli_config().logging)?;

  let cli = Cli::parse();
  match cli.command {
    Command::Provision { config, name, owner, server, env_set } => {
      command::provision(&config, &name, &owner, server, env_set).await
    }
    Command::Stop { pod_id } => command::stop(&pod_id).await,
    Command::Delete { pod_id } => command::delete(&pod_id).await,
    Command::Logs { pod_id } => command::logs(&pod_id).await,
    Command::Status => command::status().await,
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  if let Err(e) = app().await {
    error!("{e:#}");
    std::process::exit(1);
  }
  Ok(())
}
