//! Render a profile snapshot for other tools.
//!
//! Every renderer takes a plain map and emits keys in sorted order, so the
//! output is deterministic regardless of how the map was built.

use std::collections::{BTreeMap, HashMap};

/// Pretty-printed JSON object.
pub fn to_json(data: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<&String, &String> = data.iter().collect();
    serde_json::to_string_pretty(&sorted).unwrap_or_else(|_| String::from("{}"))
}

/// `export KEY='value'` lines for sourcing into a POSIX shell. Embedded
/// single quotes are escaped with the `'\''` dance.
pub fn to_shell_export(data: &HashMap<String, String>) -> String {
    let lines: Vec<String> = sorted_pairs(data)
        .into_iter()
        .map(|(key, value)| format!("export {key}='{}'", shell_escape(value)))
        .collect();
    lines.join("\n")
}

/// `KEY=value` lines for `docker run --env-file`.
pub fn to_docker_env(data: &HashMap<String, String>) -> String {
    let lines: Vec<String> = sorted_pairs(data)
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    lines.join("\n")
}

/// A standalone `.env` file body with an optional `# comment` header and a
/// trailing newline.
pub fn to_env_file(data: &HashMap<String, String>, header: Option<&str>) -> String {
    let mut lines: Vec<String> = Vec::new();
    if let Some(header) = header {
        lines.push(format!("# {header}"));
        lines.push(String::new());
    }
    for (key, value) in sorted_pairs(data) {
        lines.push(format!("{key}={value}"));
    }
    let mut content = lines.join("\n");
    content.push('\n');
    content
}

fn shell_escape(value: &str) -> String {
    value.replace('\'', r"'\''")
}

fn sorted_pairs(data: &HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut pairs: Vec<(&String, &String)> = data.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
}

// ── Tests ─────────────────────────────────────────────────────────────────────
