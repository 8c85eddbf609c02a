use serde::Serialize;

use limeship::tasks::{Registry, TaskInfo};

use super::{CmdResult, GlobalArgs};

#[derive(Serialize)]
pub struct ListOutput {
    pub command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub tasks: Vec<TaskInfo>,
}

pub fn run(global: &GlobalArgs) -> CmdResult<ListOutput> {
    let (project, _) = super::load_project(global)?;
    let registry = Registry::new(project.environment_names())?;

    Ok((
        ListOutput {
            command: "list",
            project: project.path.as_ref().map(|p| p.display().to_string()),
            tasks: registry.describe(),
        },
        0,
    ))
}
