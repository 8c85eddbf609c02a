pub type CmdResult<T> = limeship::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Project file given with `--config`.
    pub config: Option<String>,
}

pub mod list;
pub mod run;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Command,
    global: &GlobalArgs,
) -> (limeship::Result<serde_json::Value>, i32) {
    match command {
        crate::Command::List => crate::output::map_cmd_result_to_json(list::run(global)),
        crate::Command::Run(args) => {
            crate::tty::status("limeship is working...");
            dispatch!(args, global, run)
        }
    }
}

/// Load the project from `--config` or the working directory.
pub(crate) fn load_project(
    global: &GlobalArgs,
) -> limeship::Result<(limeship::project::ProjectConfig, std::path::PathBuf)> {
    let cwd = std::env::current_dir().map_err(|e| {
        limeship::Error::internal_io(e.to_string(), Some("read working directory".to_string()))
    })?;
    let project = limeship::project::load(global.config.as_deref(), &cwd)?;
    Ok((project, cwd))
}
