//! ssh/scp invocations from connection variables.

use std::collections::HashMap;
use std::io;
use std::process::{Command, ExitStatus};

const DEFAULT_USER: &str = "pi";
const DEFAULT_PORT: u16 = 22;

/// SSH connection settings resolved from a profile snapshot.
///
/// Each field falls back through aliases so device-specific profiles
/// (`RPI_*`), generic ssh profiles (`SSH_*`) and bare names all work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEnv {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub key_file: Option<String>,
}

impl SshEnv {
    pub fn from_map(data: &HashMap<String, String>) -> Self {
        Self {
            host: lookup(data, &["RPI_HOST", "SSH_HOST", "HOST"]).unwrap_or_default(),
            user: lookup(data, &["RPI_USER", "SSH_USER", "USER"])
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: lookup(data, &["RPI_PASSWORD", "SSH_PASSWORD", "PASSWORD"])
                .unwrap_or_default(),
            port: lookup(data, &["RPI_PORT", "SSH_PORT", "PORT"])
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            key_file: lookup(data, &["SSH_KEY_FILE", "KEY_FILE"]),
        }
    }

    pub fn connection_string(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Argv for an interactive or one-shot ssh session. A password routes
    /// through `sshpass` unless a key file takes precedence.
    pub fn command(&self, remote_command: Option<&str>) -> Vec<String> {
        let mut argv = Vec::new();
        if !self.password.is_empty() && self.key_file.is_none() {
            argv.extend(["sshpass".to_string(), "-p".to_string(), self.password.clone()]);
        }
        argv.push("ssh".to_string());
        if let Some(key_file) = &self.key_file {
            argv.extend(["-i".to_string(), key_file.clone()]);
        }
        argv.extend(["-p".to_string(), self.port.to_string()]);
        argv.extend(["-o".to_string(), "StrictHostKeyChecking=no".to_string()]);
        argv.push(self.connection_string());
        if let Some(remote_command) = remote_command {
            argv.push(remote_command.to_string());
        }
        argv
    }

    /// Argv copying a local path to the remote. scp spells the port flag
    /// `-P`.
    pub fn scp_to(&self, local: &str, remote: &str) -> Vec<String> {
        self.scp(local, &format!("{}:{remote}", self.connection_string()))
    }

    /// Argv copying a remote path to the local machine.
    pub fn scp_from(&self, remote: &str, local: &str) -> Vec<String> {
        self.scp(&format!("{}:{remote}", self.connection_string()), local)
    }

    fn scp(&self, src: &str, dst: &str) -> Vec<String> {
        let mut argv = Vec::new();
        if !self.password.is_empty() && self.key_file.is_none() {
            argv.extend(["sshpass".to_string(), "-p".to_string(), self.password.clone()]);
        }
        argv.push("scp".to_string());
        if let Some(key_file) = &self.key_file {
            argv.extend(["-i".to_string(), key_file.clone()]);
        }
        argv.extend(["-P".to_string(), self.port.to_string()]);
        argv.extend(["-o".to_string(), "StrictHostKeyChecking=no".to_string()]);
        argv.push(src.to_string());
        argv.push(dst.to_string());
        argv
    }

    /// Runs the ssh command, inheriting stdio.
    pub fn run(&self, remote_command: Option<&str>) -> io::Result<ExitStatus> {
        let argv = self.command(remote_command);
        Command::new(&argv[0]).args(&argv[1..]).status()
    }
}

fn lookup(data: &HashMap<String, String>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| data.get(*name).cloned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
