//! Process-supervisor unit management, §4.5. Built-in services run
//! under `supervisord`, the container init system the base image ships:
//! one `.conf` file per service under `/etc/supervisor/conf.d/`.

use command::{ContainerExec, quote_arg};
use pinacle_client::entities::log::PodLogRecord;

use crate::{ServiceOpResult, run};

const WORKSPACE: &str = "/workspace";

fn unit_path(service_name: &str) -> String {
  format!("/etc/supervisor/conf.d/{service_name}.conf")
}

fn unit_contents(service_name: &str, start_command: &str) -> String {
  format!(
    "[program:{service_name}]\ncommand={start_command}\nautostart=true\nautorestart=true\nstdout_logfile=/var/log/{service_name}.log\nstderr_logfile=/var/log/{service_name}.err.log\n"
  )
}

/// Writes the unit file and reloads supervisord so it picks up the new
/// program entry.
pub(crate) async fn write_unit_file(
  exec: &impl ContainerExec,
  pod_id: &str,
  service_name: &str,
  start_command: &str,
) -> PodLogRecord {
  let contents = unit_contents(service_name, start_command);
  let path = unit_path(service_name);
  let command = format!(
    "mkdir -p /etc/supervisor/conf.d && printf '%s' {} > {} && supervisorctl reread && supervisorctl update",
    quote_arg(&contents),
    quote_arg(&path)
  );
  run(exec, pod_id, &format!("Write Unit: {service_name}"), WORKSPACE, &command).await
}

/// Brings a service's supervised unit up, failing if it is not in the
/// `RUNNING` state after `supervisorctl start` returns.
pub async fn start_service(
  exec: &impl ContainerExec,
  pod_id: &str,
  service_name: &str,
) -> anyhow::Result<ServiceOpResult> {
  let command = format!("supervisorctl start {service_name}");
  let log = run(exec, pod_id, &format!("Start {service_name}"), WORKSPACE, &command).await;
  let result = ServiceOpResult { logs: vec![log] };
  if !result.success() {
    anyhow::bail!("service `{service_name}` failed to start");
  }
  Ok(result)
}

/// Stops a service's supervised unit. Best-effort: stopping something
/// already stopped is not an error.
pub async fn stop_service(
  exec: &impl ContainerExec,
  pod_id: &str,
  service_name: &str,
) -> ServiceOpResult {
  let command = format!("supervisorctl stop {service_name}");
  let log = run(exec, pod_id, &format!("Stop {service_name}"), WORKSPACE, &command).await;
  ServiceOpResult { logs: vec![log] }
}

/// Stops the unit and removes its `.conf` file.
pub async fn remove_service(
  exec: &impl ContainerExec,
  pod_id: &str,
  service_name: &str,
) -> ServiceOpResult {
  let mut logs = vec![stop_service(exec, pod_id, service_name).await.logs.remove(0)];
  let path = unit_path(service_name);
  let command = format!("rm -f {} && supervisorctl reread && supervisorctl update", quote_arg(&path));
  logs.push(run(exec, pod_id, &format!("Remove Unit: {service_name}"), WORKSPACE, &command).await);
  ServiceOpResult { logs }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unit_file_declares_autorestart() {
    let contents = unit_contents("web-terminal", "ttyd -p 7681");
    assert!(contents.contains("[program:web-terminal]"));
    assert!(contents.contains("autorestart=true"));
    assert!(contents.contains("command=ttyd -p 7681"));
  }

  #[test]
  fn unit_path_is_scoped_to_supervisor_conf_d() {
    assert_eq!(unit_path("postgres"), "/etc/supervisor/conf.d/postgres.conf");
  }
}
