//! Operator-defined command lists run at fixed points.
//!
//! - `after_deploy`: remote, inside the release virtualenv, after migrations
//!   and before the web server restart.
//! - `publish_commands`: local, in the working directory.
//!
//! Commands may use `{{key}}` placeholders and are rendered strictly. The
//! first failing command stops the list.

use serde::Serialize;

use crate::commands;
use crate::context::TaskContext;
use crate::error::Result;
use crate::ssh::CommandOutput;

pub const AFTER_DEPLOY: &str = "after_deploy";
pub const PUBLISH: &str = "publish_commands";

/// Result of running a single hook command.
#[derive(Debug, Clone, Serialize)]
pub struct HookCommandResult {
    pub command: String,
    pub stdout: String,
    pub exit_code: i32,
}

/// Result of running all hooks for an event.
#[derive(Debug, Clone, Serialize)]
pub struct HookRunResult {
    pub event: String,
    pub commands: Vec<HookCommandResult>,
}

impl HookRunResult {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            commands: Vec::new(),
        }
    }

    fn record(&mut self, command: String, output: CommandOutput) {
        self.commands.push(HookCommandResult {
            command,
            stdout: output.stdout,
            exit_code: output.exit_code,
        });
    }
}

/// Render the commands configured under `key`.
pub fn resolve_hooks(ctx: &TaskContext, key: &str) -> Result<Vec<String>> {
    ctx.env
        .list(key)
        .iter()
        .filter(|c| !c.trim().is_empty())
        .map(|c| ctx.env.render(c))
        .collect()
}

/// Run the `after_deploy` hooks on the current host.
pub fn run_after_deploy(ctx: &TaskContext) -> Result<HookRunResult> {
    let mut result = HookRunResult::new(AFTER_DEPLOY);
    for command in resolve_hooks(ctx, AFTER_DEPLOY)? {
        let output = ctx.run(&commands::in_venv(&ctx.env, &command)?)?;
        result.record(command, output);
    }
    Ok(result)
}

/// Run the publish commands locally.
pub fn run_publish(ctx: &TaskContext) -> Result<HookRunResult> {
    let mut result = HookRunResult::new(PUBLISH);
    for command in resolve_hooks(ctx, PUBLISH)? {
        let output = ctx.local(&command)?;
        result.record(command, output);
    }
    Ok(result)
}
