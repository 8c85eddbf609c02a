//! Switching the live release without deploying.

use serde::Serialize;

use crate::commands;
use crate::context::TaskContext;
use crate::error::{Error, Result};
use crate::release::{self, ReleaseId, ReleaseListing};

#[derive(Debug, Clone, Serialize)]
pub struct SwitchResult {
    pub before: ReleaseListing,
    pub after: ReleaseListing,
}

/// Swap `current` and `previous`, then restart. Running it twice restores
/// the original mapping.
pub fn rollback(ctx: &TaskContext) -> Result<SwitchResult> {
    log_status!("rollback", "Rollback deployed changes");
    ctx.env.require(&["hosts", "vhost_path"])?;

    let swap = commands::swap_links(&ctx.env)?;
    let restart = commands::restart(&ctx.env)?;

    let before = release::inspect(ctx)?;
    if before.current.is_none() || before.previous.is_none() {
        return Err(Error::validation_invalid_argument(
            "rollback",
            format!(
                "Nothing to roll back to on {}: both releases/current and releases/previous must exist",
                ctx.host()?
            ),
            None,
            None,
        ));
    }
    ctx.run(&swap)?;
    let after = release::inspect(ctx)?;

    ctx.run(&restart)?;
    Ok(SwitchResult { before, after })
}

/// Make an existing release live: retire `previous`, demote `current`,
/// link `version` as `current`, relink local settings and restart.
pub fn deploy_version(ctx: &mut TaskContext, version: &str) -> Result<SwitchResult> {
    ctx.env.require(&["hosts", "vhost_path"])?;
    let version = ReleaseId::parse(version)?;
    ctx.env.set("version", version.to_string());
    log_status!("deploy", "Activate release {}", version);

    let activate = commands::activate_release(&ctx.env, version.as_str())?;
    let link_settings = commands::link_local_settings(&ctx.env)?;
    let restart = commands::restart(&ctx.env)?;

    let before = release::inspect(ctx)?;
    if !before.releases.iter().any(|r| r == version.as_str()) {
        return Err(Error::validation_invalid_argument(
            "version",
            format!("Release '{}' does not exist on {}", version, ctx.host()?),
            Some(version.to_string()),
            Some(before.releases.clone()),
        ));
    }
    ctx.run(&activate)?;
    ctx.run(&link_settings)?;
    let after = release::inspect(ctx)?;

    ctx.run(&restart)?;
    Ok(SwitchResult { before, after })
}
