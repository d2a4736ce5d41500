//! docker run flags and compose snippets from a profile snapshot.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct DockerEnv {
    data: HashMap<String, String>,
}

impl DockerEnv {
    pub fn new(data: HashMap<String, String>) -> Self {
        Self { data }
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.data
    }

    /// Writes a `--env-file` compatible file, keys sorted, trailing newline.
    pub fn write_env_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut content = String::new();
        for (key, value) in self.sorted() {
            content.push_str(&format!("{key}={value}\n"));
        }
        fs::write(path, content)
    }

    /// Argv for `docker run` with every variable passed as `-e KEY=value`.
    pub fn run_command(&self, image: &str, command: &[&str], extra_args: &[&str]) -> Vec<String> {
        let mut argv = vec!["docker".to_string(), "run".to_string()];
        for (key, value) in self.sorted() {
            argv.push("-e".to_string());
            argv.push(format!("{key}={value}"));
        }
        argv.extend(extra_args.iter().map(|arg| arg.to_string()));
        argv.push(image.to_string());
        argv.extend(command.iter().map(|arg| arg.to_string()));
        argv
    }

    /// `environment:` block for pasting into a compose service.
    pub fn compose_environment(&self) -> String {
        let mut block = String::from("environment:");
        for (key, value) in self.sorted() {
            block.push_str(&format!("\n  - {key}={value}"));
        }
        block
    }

    fn sorted(&self) -> Vec<(&String, &String)> {
        let mut pairs: Vec<(&String, &String)> = self.data.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
