// Command execution seam - routes to the local shell or to SSH per host

use std::path::Path;

use crate::error::Result;
use crate::ssh::{execute_local_command_in_dir, CommandOutput, Host, SshClient};

/// The primitives every task is built from.
///
/// Implementations report what happened; they do not judge exit codes.
/// [`crate::context::TaskContext`] turns non-zero exits into errors.
pub trait Executor {
    /// Run a shell command on the local machine.
    fn run_local(&self, command: &str, dir: Option<&Path>) -> Result<CommandOutput>;

    /// Run a shell command on `host`.
    fn run_remote(&self, host: &Host, command: &str) -> Result<CommandOutput>;

    /// Copy a local file to `remote_path` on `host`.
    fn put(&self, host: &Host, local_path: &Path, remote_path: &str) -> Result<CommandOutput>;
}

/// Production executor: `sh -c` locally, the system `ssh` client remotely.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl Executor for ShellExecutor {
    fn run_local(&self, command: &str, dir: Option<&Path>) -> Result<CommandOutput> {
        Ok(execute_local_command_in_dir(command, dir))
    }

    fn run_remote(&self, host: &Host, command: &str) -> Result<CommandOutput> {
        let client = SshClient::for_host(host)?;
        Ok(client.execute(command))
    }

    fn put(&self, host: &Host, local_path: &Path, remote_path: &str) -> Result<CommandOutput> {
        let client = SshClient::for_host(host)?;
        Ok(client.upload_file(local_path, remote_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_commands_run_in_the_given_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();

        let out = ShellExecutor.run_local("ls", Some(dir.path())).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "marker");
    }

    #[test]
    fn put_to_localhost_copies_the_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("dest.txt");
        std::fs::write(&src, "payload").unwrap();

        let host = Host::parse("localhost", None).unwrap();
        let out = ShellExecutor
            .put(&host, &src, dest.to_str().unwrap())
            .unwrap();

        assert!(out.success, "{}", out.error_text());
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "payload");
    }

    #[test]
    fn failing_remote_command_reports_exit_code() {
        let host = Host::parse("127.0.0.1", None).unwrap();
        let out = ShellExecutor.run_remote(&host, "exit 3").unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, 3);
    }
}
