use std::collections::{HashMap, HashSet};

use anyhow::Context;
use pinacle_client::entities::spec::PodSpec;

/// Interpolates `[[VARIABLE]]`-style references into a pod spec's
/// commands and environment, drawing values from the variables map (the
/// spec's own expanded `environment`) and a secrets map (an env-set's
/// variables, which interpolate the same way but are redacted when
/// reporting what was replaced).
pub struct Interpolator<'a> {
  variables: Option<&'a HashMap<String, String>>,
  secrets: &'a HashMap<String, String>,
  variable_replacers: HashSet<(String, String)>,
  pub secret_replacers: HashSet<(String, String)>,
}

impl<'a> Interpolator<'a> {
  pub fn new(
    variables: Option<&'a HashMap<String, String>>,
    secrets: &'a HashMap<String, String>,
  ) -> Interpolator<'a> {
    Interpolator {
      variables,
      secrets,
      variable_replacers: Default::default(),
      secret_replacers: Default::default(),
    }
  }

  /// Interpolates every value in `spec.environment`, the install
  /// command, and each process's start command / health check.
  pub fn interpolate_pod_spec(
    &mut self,
    spec: &mut PodSpec,
  ) -> anyhow::Result<&mut Self> {
    let keys = spec.environment.keys().cloned().collect::<Vec<_>>();
    for key in keys {
      if let Some(value) = spec.environment.get_mut(&key) {
        self.interpolate_string(value)?;
      }
    }
    if let Some(install) = &mut spec.install_command {
      match install {
        pinacle_client::entities::pod::StartCommand::Single(s) => {
          self
            .interpolate_string(s)
            .context("failed interpolation into install command")?;
        }
        pinacle_client::entities::pod::StartCommand::Multiple(parts) => {
          for part in parts {
            self
              .interpolate_string(part)
              .context("failed interpolation into install command")?;
          }
        }
      }
    }
    for process in &mut spec.processes {
      let mut command = process.config.start_command.as_shell_command();
      self
        .interpolate_string(&mut command)
        .context("failed interpolation into process start command")?;
      process.config.start_command =
        pinacle_client::entities::pod::StartCommand::Single(command);
    }
    Ok(self)
  }

  pub fn interpolate_string(
    &mut self,
    target: &mut String,
  ) -> anyhow::Result<&mut Self> {
    if target.is_empty() {
      return Ok(self);
    }

    // first pass - variables
    let res = if let Some(variables) = self.variables {
      let (res, more_replacers) = svi::interpolate_variables(
        target,
        variables,
        svi::Interpolator::DoubleBrackets,
        false,
      )
      .with_context(|| {
        format!("failed to interpolate variables into target '{target}'")
      })?;
      self.variable_replacers.extend(more_replacers);
      res
    } else {
      target.to_string()
    };

    // second pass - secrets
    let (res, more_replacers) = svi::interpolate_variables(
      &res,
      self.secrets,
      svi::Interpolator::DoubleBrackets,
      false,
    )
    .with_context(|| {
      format!("failed to interpolate secrets into target '{target}'")
    })?;
    self.secret_replacers.extend(more_replacers);

    *target = res;

    Ok(self)
  }

  /// Summarizes what was replaced, suitable for attaching to the
  /// provisioning Command Log: variable substitutions are shown in
  /// full, secret substitutions show only the variable name that was
  /// replaced, never the value.
  pub fn summary_lines(&self) -> Vec<String> {
    let mut lines = Vec::new();
    for (value, variable) in &self.variable_replacers {
      lines.push(format!("{variable} => {value}"));
    }
    for (_, variable) in &self.secret_replacers {
      lines.push(format!("replaced secret: {variable}"));
    }
    lines
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interpolates_variables_then_secrets() {
    let variables =
      HashMap::from([("HOST".to_string(), "example.com".to_string())]);
    let secrets =
      HashMap::from([("TOKEN".to_string(), "shh".to_string())]);
    let mut interpolator = Interpolator::new(Some(&variables), &secrets);
    let mut target = "curl https://[[HOST]]/x?token=[[TOKEN]]".to_string();
    interpolator.interpolate_string(&mut target).unwrap();
    assert_eq!(target, "curl https://example.com/x?token=shh");
  }

  #[test]
  fn summary_redacts_secret_values() {
    let secrets =
      HashMap::from([("TOKEN".to_string(), "shh".to_string())]);
    let mut interpolator = Interpolator::new(None, &secrets);
    let mut target = "token=[[TOKEN]]".to_string();
    interpolator.interpolate_string(&mut target).unwrap();
    let lines = interpolator.summary_lines();
    assert!(lines.iter().any(|l| l.contains("TOKEN")));
    assert!(!lines.iter().any(|l| l.contains("shh")));
  }
}
