//! Small text parsers shared by the command runner and the config layer.
//! Kept dependency-free so both `command` and `config` can pull them in
//! without pulling in the rest of this crate's entities.

/// Parses a multiline shell script into a single `&&`-chained command.
/// Supports full-line and end-of-line `#` comments. Blank / comment-only
/// lines are dropped. Returns an empty string if nothing is left.
pub fn parse_multiline_command(command: impl AsRef<str>) -> String {
  command
    .as_ref()
    .lines()
    .map(strip_comment)
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join(" && ")
}

fn strip_comment(line: &str) -> &str {
  let mut in_single = false;
  let mut in_double = false;
  let bytes = line.as_bytes();
  for (i, &b) in bytes.iter().enumerate() {
    match b {
      b'\'' if !in_double => in_single = !in_single,
      b'"' if !in_single => in_double = !in_double,
      b'#' if !in_single && !in_double => return &line[..i],
      _ => {}
    }
  }
  line
}

/// Normalizes the declarative config's `version` field, which YAML may
/// hand back as either a string or a float, to the canonical string form.
pub fn normalize_version(raw: &serde_json::Value) -> String {
  match raw {
    serde_json::Value::String(s) => s.clone(),
    serde_json::Value::Number(n) => {
      let s = n.to_string();
      if s.contains('.') { s } else { format!("{s}.0") }
    }
    _ => String::from("1.0"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drops_full_line_and_comment_only_lines() {
    let input = "# full line comment\npnpm install\n\n# another\npnpm build";
    assert_eq!(
      parse_multiline_command(input),
      "pnpm install && pnpm build"
    );
  }

  #[test]
  fn strips_end_of_line_comments_but_not_quoted_hashes() {
    let input = "echo \"hello # world\" # trailing comment\nls -la # list";
    assert_eq!(
      parse_multiline_command(input),
      "echo \"hello # world\" && ls -la"
    );
  }

  #[test]
  fn empty_after_parse_yields_empty_string() {
    assert_eq!(parse_multiline_command("# only comments\n# here"), "");
  }

  #[test]
  fn normalizes_quoted_and_unquoted_version() {
    assert_eq!(
      normalize_version(&serde_json::json!("1.0")),
      "1.0"
    );
    assert_eq!(normalize_version(&serde_json::json!(1.0)), "1.0");
    assert_eq!(normalize_version(&serde_json::json!(1)), "1.0");
  }
}
