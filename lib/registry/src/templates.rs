//! The project template registry, §4.9. Each template fixes the pod's
//! base image and the shell steps [`crate::expand::expand_spec`] passes
//! through to [`git::initialize_template`] when `githubRepoSetup.type ==
//! "new"`.

use std::collections::HashMap;
use std::sync::OnceLock;

use pinacle_client::entities::registry::TemplateDefinition;

pub const NEXTJS: &str = "nextjs";
pub const VITE: &str = "vite";

pub fn template(id: &str) -> Option<TemplateDefinition> {
  table().get(id).cloned()
}

fn table() -> &'static HashMap<&'static str, TemplateDefinition> {
  static TABLE: OnceLock<HashMap<&'static str, TemplateDefinition>> =
    OnceLock::new();
  TABLE.get_or_init(|| {
    HashMap::from([
      (
        NEXTJS,
        TemplateDefinition {
          id: NEXTJS.to_string(),
          base_image: "pinacle/base-node:latest".to_string(),
          init_script: vec![
            "npx --yes create-next-app@latest app --yes".to_string(),
            "cd app && pnpm install".to_string(),
          ],
          default_env: HashMap::from([(
            "NODE_ENV".to_string(),
            "development".to_string(),
          )]),
        },
      ),
      (
        VITE,
        TemplateDefinition {
          id: VITE.to_string(),
          base_image: "pinacle/base-node:latest".to_string(),
          init_script: vec![
            "npx --yes create-vite@latest app -- --template react-ts"
              .to_string(),
            "cd app && pnpm install".to_string(),
          ],
          default_env: HashMap::from([(
            "NODE_ENV".to_string(),
            "development".to_string(),
          )]),
        },
      ),
    ])
  })
}

const DEFAULT_BASE_IMAGE: &str = "pinacle/base:latest";

/// Base image for pods with no template: the registry's default, not a
/// particular template's.
pub fn default_base_image() -> &'static str {
  DEFAULT_BASE_IMAGE
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_templates_resolve() {
    assert_eq!(template(NEXTJS).unwrap().id, NEXTJS);
    assert_eq!(template(VITE).unwrap().id, VITE);
  }

  #[test]
  fn unknown_template_is_none() {
    assert!(template("sveltekit").is_none());
  }
}
