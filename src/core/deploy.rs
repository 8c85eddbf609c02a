//! The release pipeline run by the `deploy` task.
//!
//! ```text
//! Updating -> Symlinking -> InstallingDeps -> CollectingStatic -> CleaningUp
//!          -> [Migrating] -> PostDeployHook -> Restarting
//! ```
//!
//! Stages run strictly in order. The interrupt flag is checked before each
//! stage. On interrupt or failure the local archive of the release (if one
//! exists) is deleted and the remaining stages are skipped. Remote state is
//! left as it is.

pub mod steps;

use serde::Serialize;
use std::fmt;

use crate::commands;
use crate::context::TaskContext;
use crate::delivery::{self, Strategy};
use crate::error::{Error, InterruptedDetails, Result};
use crate::hooks;
use crate::release::{ReleaseId, CURRENT};

/// Keys `deploy` needs before it touches anything.
pub const REQUIRED_KEYS: &[&str] = &[
    "branch",
    "vhosts_root",
    "host_name",
    "vhost_path",
    "release_path",
    "hosts",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Updating,
    Symlinking,
    InstallingDeps,
    CollectingStatic,
    CleaningUp,
    Migrating,
    PostDeployHook,
    Restarting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Updating => "updating",
            Stage::Symlinking => "symlinking",
            Stage::InstallingDeps => "installing_deps",
            Stage::CollectingStatic => "collecting_static",
            Stage::CleaningUp => "cleaning_up",
            Stage::Migrating => "migrating",
            Stage::PostDeployHook => "post_deploy_hook",
            Stage::Restarting => "restarting",
        }
    }

    fn run(self, ctx: &mut TaskContext) -> Result<()> {
        match self {
            Stage::Updating => steps::update_code(ctx),
            Stage::Symlinking => steps::symlink_current_release(ctx),
            Stage::InstallingDeps => steps::install_requirements(ctx, false),
            Stage::CollectingStatic => steps::collect_static_files(ctx),
            Stage::CleaningUp => steps::cleanup(ctx),
            Stage::Migrating => steps::migrate(ctx),
            Stage::PostDeployHook => steps::after_deploy(ctx),
            Stage::Restarting => steps::restart_webserver(ctx),
        }
    }

    /// Build every command the stage would run without running any of them,
    /// so a missing key fails the deploy before the first remote action.
    fn check(self, ctx: &TaskContext, release: &ReleaseId) -> Result<()> {
        let env = &ctx.env;
        match self {
            Stage::Updating => {
                commands::ls_remote(env)?;
                match Strategy::from_env(ctx) {
                    Strategy::Repository => {
                        commands::refresh_cached_copy(env, "HEAD")?;
                        commands::copy_cached_copy(env, release)?;
                    }
                    Strategy::Archive => {
                        commands::rev_parse(env)?;
                        commands::git_archive(env, release)?;
                        commands::make_release_dir(env, release)?;
                        commands::unpack_archive(env, release, &delivery::upload_path(release))?;
                    }
                }
            }
            Stage::Symlinking => {
                commands::activate_release(env, release.as_str())?;
                commands::link_local_settings(env)?;
            }
            Stage::InstallingDeps => {
                commands::pip_install(env, false)?;
            }
            Stage::CollectingStatic => {
                commands::configured_in_venv(env, "static_command")?;
            }
            Stage::CleaningUp => {
                env.usize("keep_releases")?;
                commands::list_releases(env)?;
                commands::read_link(env, CURRENT)?;
            }
            Stage::Migrating => {
                commands::configured_in_venv(env, "migrate_command")?;
            }
            Stage::PostDeployHook => {
                for command in hooks::resolve_hooks(ctx, hooks::AFTER_DEPLOY)? {
                    commands::in_venv(env, &command)?;
                }
            }
            Stage::Restarting => {
                commands::restart(env)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    pub migrate: bool,
}

impl DeployOptions {
    /// Parse task arguments; `migrate` is the only one accepted.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        for arg in args {
            match arg.trim() {
                "" => {}
                "migrate" => options.migrate = true,
                other => {
                    return Err(Error::validation_invalid_argument(
                        "deploy",
                        format!("Unknown deploy argument '{}'", other),
                        Some(other.to_string()),
                        Some(vec!["migrate".to_string()]),
                    ))
                }
            }
        }
        Ok(options)
    }
}

/// Stages for a run, in order.
pub fn plan(options: DeployOptions) -> Vec<Stage> {
    let mut stages = vec![
        Stage::Updating,
        Stage::Symlinking,
        Stage::InstallingDeps,
        Stage::CollectingStatic,
        Stage::CleaningUp,
    ];
    if options.migrate {
        stages.push(Stage::Migrating);
    }
    stages.push(Stage::PostDeployHook);
    stages.push(Stage::Restarting);
    stages
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub release: ReleaseId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub stages: Vec<Stage>,
}

/// Check required keys and pick the release identifier. Runs once per
/// `deploy` invocation so every host receives the same release.
///
/// Every command of the planned stages is built here first: a missing or
/// malformed key fails before any host is touched.
pub fn prepare(ctx: &mut TaskContext, options: DeployOptions) -> Result<ReleaseId> {
    ctx.env.require(REQUIRED_KEYS)?;
    let release = ReleaseId::now();
    ctx.env.set("release", release.to_string());
    ctx.env.unset("rev");

    if let Err(err) = preflight(ctx, options, &release) {
        ctx.env.unset("release");
        return Err(err);
    }
    log_status!("deploy", "Start deployment of release {}", release);
    Ok(release)
}

fn preflight(ctx: &TaskContext, options: DeployOptions, release: &ReleaseId) -> Result<()> {
    plan(options)
        .into_iter()
        .try_for_each(|stage| stage.check(ctx, release))
}

/// Run the pipeline on the current host.
pub fn run(ctx: &mut TaskContext, options: DeployOptions) -> Result<DeployReport> {
    let release = match ctx.env.str("release") {
        Some(raw) => ReleaseId::parse(raw)?,
        None => prepare(ctx, options)?,
    };
    let _guard = ctx.interrupt.guard();

    let mut completed = Vec::new();
    for stage in plan(options) {
        if ctx.interrupt.is_set() {
            return Err(abort(ctx, stage, None));
        }

        log_status!("deploy", "{}", stage);
        if let Err(err) = stage.run(ctx) {
            return Err(abort(ctx, stage, Some(err)));
        }
        completed.push(stage);
    }

    Ok(DeployReport {
        release,
        rev: ctx.env.str("rev").map(str::to_string),
        stages: completed,
    })
}

/// Remove local temporaries and build the error to report.
///
/// A failure while the interrupt flag is set (Ctrl-C also reaches child
/// processes) is reported as an interruption.
fn abort(ctx: &mut TaskContext, stage: Stage, cause: Option<Error>) -> Error {
    let removed = ctx.remove_artifacts();
    for path in &removed {
        log_status!("deploy", "Cleanup tarball {}", path.display());
    }
    let removed_archive = removed.first().map(|p| p.display().to_string());

    match cause {
        Some(err) if !ctx.interrupt.is_set() => err,
        _ => Error::deploy_interrupted(InterruptedDetails {
            stage: Some(stage.to_string()),
            removed_archive,
        }),
    }
}
