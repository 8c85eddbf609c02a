use std::path::{Path, PathBuf};

use crate::environment::Environment;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::executor::Executor;
use crate::interrupt::InterruptFlag;
use crate::project::ProjectConfig;
use crate::ssh::{CommandOutput, Host};

/// Everything a task runs against: the environment, the executor, the host
/// currently being worked on and the local temporaries it has created.
pub struct TaskContext<'a> {
    pub env: Environment,
    pub project: &'a ProjectConfig,
    pub interrupt: InterruptFlag,
    executor: &'a dyn Executor,
    host: Option<Host>,
    local_dir: PathBuf,
    artifacts: Vec<PathBuf>,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        env: Environment,
        project: &'a ProjectConfig,
        executor: &'a dyn Executor,
        interrupt: InterruptFlag,
        local_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            env,
            project,
            interrupt,
            executor,
            host: None,
            local_dir: local_dir.into(),
            artifacts: Vec::new(),
        }
    }

    /// Working directory for local commands.
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Local clone used for `git ls-remote`, `git rev-parse` and archives.
    pub fn repo_dir(&self) -> PathBuf {
        match self.env.str("local_repo_path") {
            Some(path) => self.local_dir.join(crate::paths::expand(path)),
            None => self.local_dir.clone(),
        }
    }

    /// Configured hosts, in order.
    pub fn hosts(&self) -> Result<Vec<Host>> {
        self.env.require(&["hosts"])?;
        let user = self.env.str("user");
        let identity_file = self.env.str("identity_file");

        self.env
            .list("hosts")
            .iter()
            .map(|raw| Host::parse(raw, user).map(|h| h.with_identity_file(identity_file)))
            .collect()
    }

    pub fn host(&self) -> Result<&Host> {
        self.host.as_ref().ok_or_else(|| {
            Error::internal_unexpected("remote command issued outside of a host-scoped task")
        })
    }

    pub fn set_host(&mut self, host: Option<Host>) {
        self.host = host;
    }

    /// Run on the current host; a non-zero exit is an execution error.
    pub fn run(&self, command: &str) -> Result<CommandOutput> {
        let host = self.host()?;
        log_status!("run", "[{}] {}", host, command);

        let output = self.executor.run_remote(host, command)?;
        if output.success {
            return Ok(output);
        }

        Err(Error::remote_command_failed(CommandFailedDetails {
            command: command.to_string(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            host: Some(host.to_string()),
        }))
    }

    /// Run locally in the working directory.
    pub fn local(&self, command: &str) -> Result<CommandOutput> {
        self.local_in(command, &self.local_dir)
    }

    pub fn local_in(&self, command: &str, dir: &Path) -> Result<CommandOutput> {
        log_status!("local", "{}", command);

        let output = self.executor.run_local(command, Some(dir))?;
        if output.success {
            return Ok(output);
        }

        Err(Error::local_command_failed(CommandFailedDetails {
            command: command.to_string(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            host: None,
        }))
    }

    /// Upload a local file to the current host.
    pub fn put(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let host = self.host()?;
        log_status!("put", "[{}] {} -> {}", host, local_path.display(), remote_path);

        let output = self.executor.put(host, local_path, remote_path)?;
        if output.success {
            return Ok(());
        }

        Err(Error::remote_command_failed(CommandFailedDetails {
            command: format!("put {} {}", local_path.display(), remote_path),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            host: Some(host.to_string()),
        }))
    }

    /// Register a local temporary that must not outlive an aborted deploy.
    pub fn track_artifact(&mut self, path: PathBuf) {
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
    }

    /// Stop tracking a temporary that was cleaned up normally.
    pub fn forget_artifact(&mut self, path: &Path) {
        self.artifacts.retain(|p| p != path);
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Delete every tracked temporary that exists; returns what was removed.
    pub fn remove_artifacts(&mut self) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        for path in self.artifacts.drain(..) {
            if path.exists() && std::fs::remove_file(&path).is_ok() {
                removed.push(path);
            }
        }
        removed
    }
}
