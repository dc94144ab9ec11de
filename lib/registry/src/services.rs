//! The built-in service registry, §4.5 / §4.9. Each entry pairs the
//! serializable [`ServiceDefinition`] metadata with function pointers for
//! `start_command` and `health_check`, since both are functions of the
//! expanded spec (e.g. a service's allocated port) rather than fixed
//! strings.

use std::collections::HashMap;
use std::sync::OnceLock;

use pinacle_client::entities::registry::ServiceDefinition;
use pinacle_client::entities::spec::{PodSpec, ServiceSpec};

pub const WEB_TERMINAL: &str = "web-terminal";
pub const CODE_SERVER: &str = "code-server";
pub const POSTGRES: &str = "postgres";
pub const CLAUDE_CODE: &str = "claude-code";

/// A built-in service's full definition: the serializable metadata plus
/// the two functions the Service Provisioner calls at provision/start
/// time and at health-check time.
#[derive(Clone, Copy)]
pub struct ServiceEntry {
  pub definition: &'static ServiceDefinition,
  pub start_command: fn(&PodSpec, &ServiceSpec) -> String,
  pub health_check: fn(&PodSpec, &ServiceSpec) -> String,
}

fn service_port(spec: &ServiceSpec, name: &str) -> Option<u16> {
  spec.ports.iter().find(|p| p.name == name).map(|p| p.internal)
}

fn web_terminal_start(spec: &PodSpec, svc: &ServiceSpec) -> String {
  let port = service_port(svc, "web-terminal").unwrap_or(7681);
  format!("ttyd -p {port} -W bash -l -c {}", spec.working_dir)
}

fn web_terminal_health(_spec: &PodSpec, svc: &ServiceSpec) -> String {
  let port = service_port(svc, "web-terminal").unwrap_or(7681);
  format!("curl -fsS http://127.0.0.1:{port}/")
}

fn code_server_start(spec: &PodSpec, svc: &ServiceSpec) -> String {
  let port = service_port(svc, "code-server").unwrap_or(8080);
  format!(
    "code-server --bind-addr 0.0.0.0:{port} --auth none {}",
    spec.working_dir
  )
}

fn code_server_health(_spec: &PodSpec, svc: &ServiceSpec) -> String {
  let port = service_port(svc, "code-server").unwrap_or(8080);
  format!("curl -fsS http://127.0.0.1:{port}/healthz")
}

fn postgres_start(_spec: &PodSpec, _svc: &ServiceSpec) -> String {
  "su postgres -c '/usr/lib/postgresql/*/bin/postgres -D /var/lib/postgresql/data'"
    .to_string()
}

fn postgres_health(_spec: &PodSpec, _svc: &ServiceSpec) -> String {
  "pg_isready -U postgres".to_string()
}

fn claude_code_start(spec: &PodSpec, _svc: &ServiceSpec) -> String {
  format!("cd {} && claude --dangerously-skip-permissions", spec.working_dir)
}

fn claude_code_health(_spec: &PodSpec, _svc: &ServiceSpec) -> String {
  "which claude".to_string()
}

fn definitions() -> &'static HashMap<&'static str, ServiceDefinition> {
  static DEFS: OnceLock<HashMap<&'static str, ServiceDefinition>> =
    OnceLock::new();
  DEFS.get_or_init(|| {
    HashMap::from([
      (
        WEB_TERMINAL,
        ServiceDefinition {
          id: WEB_TERMINAL.to_string(),
          install_steps: vec![
            "command -v ttyd || (apt-get update && apt-get install -y ttyd)"
              .to_string(),
          ],
          default_port: Some(7681),
          default_env: HashMap::new(),
          required_env: vec![],
          depends_on: vec![],
          start_delay_secs: 1,
          health_retries: 3,
        },
      ),
      (
        CODE_SERVER,
        ServiceDefinition {
          id: CODE_SERVER.to_string(),
          install_steps: vec![
            "command -v code-server || curl -fsSL https://code-server.dev/install.sh | sh"
              .to_string(),
          ],
          default_port: Some(8080),
          default_env: HashMap::new(),
          required_env: vec![],
          depends_on: vec![],
          start_delay_secs: 2,
          health_retries: 5,
        },
      ),
      (
        POSTGRES,
        ServiceDefinition {
          id: POSTGRES.to_string(),
          install_steps: vec![
            "command -v psql || (apt-get update && apt-get install -y postgresql)"
              .to_string(),
            "su postgres -c 'test -d /var/lib/postgresql/data || initdb -D /var/lib/postgresql/data'"
              .to_string(),
          ],
          default_port: Some(5432),
          default_env: HashMap::from([(
            "POSTGRES_PASSWORD".to_string(),
            "postgres".to_string(),
          )]),
          required_env: vec![],
          depends_on: vec![],
          start_delay_secs: 2,
          health_retries: 5,
        },
      ),
      (
        CLAUDE_CODE,
        ServiceDefinition {
          id: CLAUDE_CODE.to_string(),
          install_steps: vec![
            "command -v claude || npm install -g @anthropic-ai/claude-code"
              .to_string(),
          ],
          default_port: None,
          default_env: HashMap::new(),
          required_env: vec!["ANTHROPIC_API_KEY".to_string()],
          depends_on: vec![WEB_TERMINAL.to_string()],
          start_delay_secs: 0,
          health_retries: 2,
        },
      ),
    ])
  })
}

pub fn entry(id: &str) -> Option<ServiceEntry> {
  let definition = definitions().get(id)?;
  let (start_command, health_check): (
    fn(&PodSpec, &ServiceSpec) -> String,
    fn(&PodSpec, &ServiceSpec) -> String,
  ) = match id {
    WEB_TERMINAL => (web_terminal_start, web_terminal_health),
    CODE_SERVER => (code_server_start, code_server_health),
    POSTGRES => (postgres_start, postgres_health),
    CLAUDE_CODE => (claude_code_start, claude_code_health),
    _ => return None,
  };
  Some(ServiceEntry { definition, start_command, health_check })
}

pub fn known_service_ids() -> Vec<&'static str> {
  definitions().keys().copied().collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn claude_code_depends_on_web_terminal() {
    let entry = entry(CLAUDE_CODE).unwrap();
    assert_eq!(entry.definition.depends_on, vec![WEB_TERMINAL.to_string()]);
  }

  #[test]
  fn unknown_service_is_none() {
    assert!(entry("no-such-service").is_none());
  }

  #[test]
  fn every_known_id_resolves_to_an_entry() {
    for id in known_service_ids() {
      assert!(entry(id).is_some());
    }
  }
}
