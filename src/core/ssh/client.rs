use crate::error::{Error, Result};
use crate::interrupt::InterruptFlag;
use crate::utils::shell;
use std::path::Path;
use std::process::Command;

use super::Host;

pub struct SshClient {
    pub host: Host,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }

    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

impl SshClient {
    pub fn for_host(host: &Host) -> Result<Self> {
        let identity_file = match host.identity_file.as_deref() {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        host.to_string(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&host.host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", host);
        }

        Ok(Self {
            host: host.clone(),
            identity_file,
            is_local,
        })
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.host.port != 22 {
            args.push("-p".to_string());
            args.push(self.host.port.to_string());
        }

        // Fail fast on dead connections and never stop at a prompt; the
        // remote command itself runs without a time limit.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(self.host.destination());
        args.push(command.to_string());

        args
    }

    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command, None, 3)
    }

    /// Stream a local file to `remote_path` over the SSH channel.
    pub fn upload_file(&self, local_path: &Path, remote_path: &str) -> CommandOutput {
        let remote_command = format!("cat > {}", shell::quote_path(remote_path));
        self.execute_with_retry(&remote_command, Some(local_path), 3)
    }

    fn execute_with_retry(
        &self,
        command: &str,
        stdin_file: Option<&Path>,
        max_attempts: u32,
    ) -> CommandOutput {
        let backoff_secs = [0, 2, 5];
        let mut last = CommandOutput::failed(-1, "SSH retry exhausted");

        if self.is_local {
            return self.execute_once(command, stdin_file);
        }

        for attempt in 0..max_attempts {
            let result = self.execute_once(command, stdin_file);

            // Only retry connection setup failures, and never after Ctrl-C
            if result.success
                || attempt + 1 >= max_attempts
                || !is_transient_ssh_error(&result)
                || InterruptFlag::Process.is_set()
            {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize + 1).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s...",
                self.host,
                attempt + 1,
                max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
            last = result;
        }

        last
    }

    fn execute_once(&self, command: &str, stdin_file: Option<&Path>) -> CommandOutput {
        if self.is_local {
            if let Some(stdin_file_path) = stdin_file {
                let local_cmd = format!(
                    "cat {} | {}",
                    shell::quote_path(&stdin_file_path.to_string_lossy()),
                    command
                );
                return execute_local_command(&local_cmd);
            }
            return execute_local_command(command);
        }

        let mut cmd = Command::new("ssh");
        cmd.args(self.build_ssh_args(command));

        if let Some(stdin_file_path) = stdin_file {
            match std::fs::File::open(stdin_file_path) {
                Ok(file) => {
                    cmd.stdin(file);
                }
                Err(err) => {
                    return CommandOutput::failed(-1, format!("Failed to open stdin file: {}", err));
                }
            }
        }

        match cmd.output() {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput::failed(-1, format!("SSH error: {}", e)),
        }
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    execute_local_command_in_dir(command, None)
}

pub fn execute_local_command_in_dir(command: &str, current_dir: Option<&Path>) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    match cmd.output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput::failed(-1, format!("Command error: {}", e)),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure happened while setting up the connection.
///
/// Only exit 255 with a connection-setup message qualifies: by then the
/// remote command never started, so running it again is safe. A remote
/// command that fails with its own network error is never retried.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    if output.exit_code != 255 {
        return false;
    }
    let stderr = output.stderr.to_lowercase();

    let setup_patterns = [
        "ssh: connect to host",
        "connection refused",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve hostname",
        "ssh_exchange_identification",
        "kex_exchange_identification",
    ];

    setup_patterns.iter().any(|p| stderr.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(port: u16, identity: Option<&str>) -> SshClient {
        SshClient {
            host: Host {
                host: "web1.example.com".to_string(),
                user: Some("deploy".to_string()),
                port,
                identity_file: None,
            },
            identity_file: identity.map(str::to_string),
            is_local: false,
        }
    }

    #[test]
    fn ssh_args_end_with_destination_and_command() {
        let args = client(22, None).build_ssh_args("ls -x releases");
        let n = args.len();
        assert_eq!(args[n - 2], "deploy@web1.example.com");
        assert_eq!(args[n - 1], "ls -x releases");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(!args.contains(&"-p".to_string()));
    }

    #[test]
    fn ssh_args_include_port_and_identity() {
        let args = client(2222, Some("/keys/id")).build_ssh_args("true");
        assert_eq!(&args[..4], &["-i", "/keys/id", "-p", "2222"]);
    }

    #[test]
    fn missing_identity_file_is_rejected() {
        let host = Host::parse("web1", Some("deploy"))
            .unwrap()
            .with_identity_file(Some("/definitely/not/here/id_rsa"));
        let err = SshClient::for_host(&host)
            .err()
            .unwrap();
        assert_eq!(err.code, crate::error::ErrorCode::SshIdentityFileNotFound);
    }

    #[test]
    fn localhost_runs_through_the_local_shell() {
        let host = Host::parse("localhost", None).unwrap();
        let client = SshClient::for_host(&host).unwrap();
        assert!(client.is_local);

        let out = client.execute("echo hello");
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn only_connection_setup_failures_are_transient() {
        assert!(is_transient_ssh_error(&CommandOutput::failed(
            255,
            "ssh: connect to host x port 22: Connection refused"
        )));
        assert!(!is_transient_ssh_error(&CommandOutput::failed(255, "")));
        assert!(!is_transient_ssh_error(&CommandOutput::failed(
            255,
            "Killed by signal 2."
        )));
        assert!(!is_transient_ssh_error(&CommandOutput::failed(
            1,
            "ssh: connect to host x: Connection refused"
        )));
        assert!(!is_transient_ssh_error(&CommandOutput::failed(
            1,
            "pip: Connection reset by peer"
        )));
    }

    #[cfg(unix)]
    #[test]
    fn local_commands_run_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let count = dir.path().join("count");
        let host = Host::parse("localhost", None).unwrap();
        let client = SshClient::for_host(&host).unwrap();

        let started = std::time::Instant::now();
        let out = client.execute(&format!(
            "echo run >> {}; echo 'pip: Connection reset by peer' >&2; exit 255",
            shell::quote_path(&count.to_string_lossy())
        ));

        assert!(!out.success);
        assert_eq!(std::fs::read_to_string(&count).unwrap(), "run\n");
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn error_text_prefers_stderr() {
        let out = CommandOutput {
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            success: false,
            exit_code: 1,
        };
        assert_eq!(out.error_text(), "err");
        assert_eq!(CommandOutput::failed(1, "  ").error_text(), "");
    }
}
