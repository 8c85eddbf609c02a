#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;

use limeship::executor::Executor;
use limeship::interrupt::InterruptFlag;
use limeship::project::ProjectConfig;
use limeship::ssh::{CommandOutput, Host};
use limeship::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Local(String),
    Remote(String, String),
    Put(String, String),
}

impl Call {
    pub fn command(&self) -> &str {
        match self {
            Call::Local(c) | Call::Remote(_, c) | Call::Put(_, c) => c,
        }
    }
}

/// Records every call and answers from a list of `(substring, output)`
/// rules; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: RefCell<Vec<Call>>,
    rules: Vec<(String, CommandOutput)>,
    interrupt_on: Option<(String, InterruptFlag)>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: &str, output: CommandOutput) -> Self {
        self.rules.push((pattern.to_string(), output));
        self
    }

    /// Trigger `flag` and fail the call whose command contains `pattern`,
    /// the way Ctrl-C kills the running child.
    pub fn interrupt_on(mut self, pattern: &str, flag: InterruptFlag) -> Self {
        self.interrupt_on = Some((pattern.to_string(), flag));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.command().to_string()).collect()
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }

    pub fn last_position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().rposition(|c| c.contains(pattern))
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    fn answer(&self, command: &str) -> CommandOutput {
        if let Some((pattern, flag)) = &self.interrupt_on {
            if command.contains(pattern.as_str()) {
                flag.trigger();
                return CommandOutput::failed(130, "interrupted");
            }
        }
        self.rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""))
    }
}

impl Executor for RecordingExecutor {
    fn run_local(&self, command: &str, dir: Option<&Path>) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(Call::Local(command.to_string()));

        // `git archive ... -o '<name>'` leaves a file behind like the real one.
        if let (Some(dir), Some(name)) = (dir, command.split("-o ").nth(1)) {
            if command.starts_with("git archive") {
                let name = name.trim().trim_matches('\'');
                std::fs::write(dir.join(name), "archive").expect("write archive");
            }
        }
        Ok(self.answer(command))
    }

    fn run_remote(&self, host: &Host, command: &str) -> Result<CommandOutput> {
        self.calls
            .borrow_mut()
            .push(Call::Remote(host.to_string(), command.to_string()));
        Ok(self.answer(command))
    }

    fn put(&self, host: &Host, local_path: &Path, remote_path: &str) -> Result<CommandOutput> {
        let command = format!("put {} {}", local_path.display(), remote_path);
        self.calls
            .borrow_mut()
            .push(Call::Put(host.to_string(), command.clone()));
        Ok(self.answer(&command))
    }
}

pub const PROJECT: &str = r#"{
    "project_name": "shop",
    "git_host": "git.example.com",
    "after_deploy": ["python manage.py clear_cache"],
    "environments": {
        "dev":  { "user": "deploy", "branch": "develop", "hosts": ["dev.example.com"], "host_name": "dev.example.com" },
        "prod": { "user": "deploy", "branch": "master", "hosts": ["web1", "web2"], "host_name": "example.com" }
    }
}"#;

pub fn project() -> ProjectConfig {
    ProjectConfig::parse(PROJECT, "limeship.json").expect("valid project")
}

pub fn ls_remote(rev: &str) -> CommandOutput {
    CommandOutput::ok(format!("{}\trefs/heads/master\n", rev))
}
