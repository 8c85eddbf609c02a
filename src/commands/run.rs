use serde::Serialize;

use limeship::context::TaskContext;
use limeship::executor::ShellExecutor;
use limeship::interrupt::InterruptFlag;
use limeship::tasks::{self, Registry, TaskReport};

use super::{CmdResult, GlobalArgs};

pub struct RunArgs {
    /// Raw invocations, `name[:arg,...]`.
    pub tasks: Vec<String>,
}

#[derive(Serialize)]
pub struct RunOutput {
    pub command: &'static str,
    pub tasks: Vec<String>,
    pub results: Vec<TaskReport>,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunOutput> {
    let (project, cwd) = super::load_project(global)?;
    let registry = Registry::new(project.environment_names())?;
    let invocations = registry.resolve_all(&args.tasks)?;

    let executor = ShellExecutor;
    let mut ctx = TaskContext::new(
        project.seed(),
        &project,
        &executor,
        InterruptFlag::Process,
        cwd,
    );
    let results = tasks::run(&mut ctx, &invocations)?;

    Ok((
        RunOutput {
            command: "run",
            tasks: invocations.iter().map(|i| i.name.clone()).collect(),
            results,
        },
        0,
    ))
}
