use std::{path::PathBuf, sync::OnceLock};

use config::ConfigLoader;
use pinacle_client::entities::config::{CoreConfig, DatabaseConfig, Env};

/// The CLI loads the exact same [`CoreConfig`] the core daemon does — it
/// operates directly against the same database and hosts, just
/// synchronously and from a human's terminal instead of a background
/// loop.
pub fn cli_config() -> &'static CoreConfig {
  static CLI_CONFIG: OnceLock<CoreConfig> = OnceLock::new();
  CLI_CONFIG.get_or_init(|| {
    let env: Env = match envy::from_env().map_err(anyhow::Error::from) {
      Ok(env) => env,
      Err(e) => panic!("failed to parse environment | {e:#}"),
    };

    let config = if env.pinacle_config_paths.is_empty() {
      CoreConfig::default()
    } else {
      (ConfigLoader {
        paths: &env
          .pinacle_config_paths
          .iter()
          .map(PathBuf::as_path)
          .collect::<Vec<_>>(),
        match_wildcards: &[],
        include_file_name: ".pinacleinclude",
        merge_nested: true,
        extend_array: false,
        debug_print: false,
      })
      .load::<CoreConfig>()
      .unwrap_or_else(|e| panic!("failed to parse config from paths | {e:#}"))
    };

    CoreConfig {
      base_domain: env.pinacle_base_domain.unwrap_or(config.base_domain),
      ssh_private_key_path: env
        .pinacle_ssh_private_key_path
        .unwrap_or(config.ssh_private_key_path),
      github_token: env.pinacle_github_token.unwrap_or(config.github_token),
      port_range_start: env.pinacle_port_range_start.unwrap_or(config.port_range_start),
      port_range_end: env.pinacle_port_range_end.unwrap_or(config.port_range_end),
      sandbox_runtime: env.pinacle_sandbox_runtime.unwrap_or(config.sandbox_runtime),
      worker_pool_size: env.pinacle_worker_pool_size.unwrap_or(config.worker_pool_size),
      database: DatabaseConfig {
        uri: env.pinacle_database_uri.unwrap_or(config.database.uri),
        address: env.pinacle_database_address.unwrap_or(config.database.address),
        username: env.pinacle_database_username.unwrap_or(config.database.username),
        password: env.pinacle_database_password.unwrap_or(config.database.password),
        app_name: config.database.app_name,
        db_name: env.pinacle_database_db_name.unwrap_or(config.database.db_name),
      },
      logging: config.logging,
      pretty_startup_config: config.pretty_startup_config,
    }
  })
}
