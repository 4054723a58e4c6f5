use crate::config::SshSettings;
use anyhow::{Context, Result};
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Messages ssh prints when a host cannot be reached non-interactively.
pub const SSH_ERRORS: &[&str] = &[
    "Could not resolve hostname",
    "Permission denied",
    "Host key verification failed",
    "connect to host",
];

/// Output of a command run on a cluster host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr, trimmed. Tools like `java -version` and
    /// `python -V` (2.x) print to stderr, so checks compare against both.
    pub fn combined(&self) -> String {
        let out = self.stdout.trim_end();
        let err = self.stderr.trim_end();
        match (out.is_empty(), err.is_empty()) {
            (true, _) => err.trim_start().to_string(),
            (false, true) => out.trim_start().to_string(),
            (false, false) => format!("{}\n{}", out.trim_start(), err),
        }
    }
}

/// Runs shell commands on cluster hosts.
pub trait RemoteShell: Send + Sync {
    fn run(&self, host: &str, command: &str) -> Result<CommandOutput>;
}

/// Runs commands through the system `ssh` binary in batch mode.
#[derive(Debug, Clone)]
pub struct SshShell {
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub disable_strict_host_key_checking: bool,
    pub connect_timeout_secs: u64,
}

impl Default for SshShell {
    fn default() -> Self {
        Self::from_settings(&SshSettings::default())
    }
}

impl SshShell {
    pub fn from_settings(settings: &SshSettings) -> Self {
        Self {
            user: settings.user.clone(),
            identity_file: settings.identity_file.clone(),
            disable_strict_host_key_checking: settings.disable_strict_host_key_checking,
            connect_timeout_secs: settings.connect_timeout_secs,
        }
    }

    pub fn args(&self, host: &str, command: &str) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if self.connect_timeout_secs > 0 {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={}", self.connect_timeout_secs));
        }
        if let Some(key) = &self.identity_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        if self.disable_strict_host_key_checking {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=no".to_string());
        }
        match &self.user {
            Some(user) => args.push(format!("{}@{}", user, host)),
            None => args.push(host.to_string()),
        }
        args.push(command.to_string());
        args
    }
}

impl RemoteShell for SshShell {
    fn run(&self, host: &str, command: &str) -> Result<CommandOutput> {
        debug!(host, command, "ssh");
        let output = Command::new("ssh")
            .args(self.args(host, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to spawn ssh for host '{}'", host))?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Runs commands on this machine through `sh -c`; the host argument is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShell;

impl RemoteShell for LocalShell {
    fn run(&self, _host: &str, command: &str) -> Result<CommandOutput> {
        debug!(command, "local shell");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to run '{}'", command))?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run shell work on tokio's blocking pool so ssh round-trips do not stall
/// the runtime.
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("shell task panicked")
}

/// The ssh error message contained in `output`, if any.
pub fn ssh_failure(output: &CommandOutput) -> Option<&'static str> {
    let combined = output.combined();
    SSH_ERRORS.iter().copied().find(|e| combined.contains(e))
}

/// Resolve `host` the way ssh will (port 22).
pub fn resolve_host(host: &str) -> Result<()> {
    let mut addrs = (host, 22)
        .to_socket_addrs()
        .with_context(|| format!("DNS resolution failed for '{}'", host))?;
    if addrs.next().is_none() {
        anyhow::bail!("DNS resolution returned no addresses for '{}'", host);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted shell for tests: responses keyed by `(host, command)`, with a
    /// per-command fallback under host `*`.
    #[derive(Default)]
    pub struct FakeShell {
        responses: HashMap<(String, String), CommandOutput>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeShell {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, host: &str, command: &str, stdout: &str) -> Self {
            self.responses.insert(
                (host.to_string(), command.to_string()),
                CommandOutput {
                    exit_code: Some(0),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            );
            self
        }

        pub fn respond_output(mut self, host: &str, command: &str, output: CommandOutput) -> Self {
            self.responses
                .insert((host.to_string(), command.to_string()), output);
            self
        }
    }

    impl RemoteShell for FakeShell {
        fn run(&self, host: &str, command: &str) -> Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((host.to_string(), command.to_string()));
            let key = (host.to_string(), command.to_string());
            let wildcard = ("*".to_string(), command.to_string());
            Ok(self
                .responses
                .get(&key)
                .or_else(|| self.responses.get(&wildcard))
                .cloned()
                .unwrap_or(CommandOutput {
                    exit_code: Some(127),
                    stdout: String::new(),
                    stderr: format!("unexpected command: {}", command),
                }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_args_full() {
        let shell = SshShell {
            user: Some("centos".to_string()),
            identity_file: Some(PathBuf::from("/home/centos/.ssh/id_rsa")),
            disable_strict_host_key_checking: true,
            connect_timeout_secs: 0,
        };
        let args = shell.args("node1", "python -V");
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-i",
                "/home/centos/.ssh/id_rsa",
                "-o",
                "StrictHostKeyChecking=no",
                "centos@node1",
                "python -V"
            ]
        );
    }

    #[test]
    fn test_ssh_args_minimal() {
        let args = SshShell::default().args("node1", "uptime");
        assert_eq!(
            args,
            vec!["-o", "BatchMode=yes", "-o", "ConnectTimeout=10", "node1", "uptime"]
        );
    }

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: "Python 2.7.5\n".to_string(),
        };
        assert_eq!(out.combined(), "Python 2.7.5");

        let both = CommandOutput {
            exit_code: Some(0),
            stdout: "a\n".to_string(),
            stderr: "b\n".to_string(),
        };
        assert_eq!(both.combined(), "a\nb");
    }

    #[test]
    fn test_ssh_failure_detection() {
        let out = CommandOutput {
            exit_code: Some(255),
            stdout: String::new(),
            stderr: "centos@node1: Permission denied (publickey).".to_string(),
        };
        assert_eq!(ssh_failure(&out), Some("Permission denied"));
        assert_eq!(ssh_failure(&CommandOutput::default()), None);

        let changed_key = CommandOutput {
            exit_code: Some(255),
            stdout: String::new(),
            stderr: "Host key verification failed.".to_string(),
        };
        assert_eq!(ssh_failure(&changed_key), Some("Host key verification failed"));
    }

    #[tokio::test]
    async fn test_run_blocking_with_shared_shell() {
        let shell: std::sync::Arc<dyn RemoteShell> =
            std::sync::Arc::new(fake::FakeShell::new().respond("node1", "uptime", "up 3 days"));
        let worker = shell.clone();
        let output = run_blocking(move || worker.run("node1", "uptime")).await.unwrap().unwrap();
        assert_eq!(output.stdout, "up 3 days");
    }

    #[test]
    fn test_resolve_localhost() {
        assert!(resolve_host("localhost").is_ok());
    }
}
