//! Individual pipeline steps. Each is also exposed as a task of its own.

use crate::cleanup;
use crate::commands;
use crate::context::TaskContext;
use crate::delivery;
use crate::error::Result;
use crate::hooks;

pub fn update_code(ctx: &mut TaskContext) -> Result<()> {
    delivery::update(ctx).map(|_| ())
}

/// Retire `previous`, demote `current`, link the new release and its
/// local settings.
pub fn symlink_current_release(ctx: &mut TaskContext) -> Result<()> {
    let release = delivery::current_release(ctx)?;
    ctx.run(&commands::activate_release(&ctx.env, release.as_str())?)?;
    ctx.run(&commands::link_local_settings(&ctx.env)?)?;
    Ok(())
}

pub fn install_requirements(ctx: &mut TaskContext, upgrade: bool) -> Result<()> {
    log_status!("deploy", "Install runtime requirements");
    ctx.run(&commands::pip_install(&ctx.env, upgrade)?)?;
    Ok(())
}

pub fn collect_static_files(ctx: &mut TaskContext) -> Result<()> {
    log_status!("deploy", "Collect static files");
    ctx.run(&commands::configured_in_venv(&ctx.env, "static_command")?)?;
    Ok(())
}

pub fn syncdb(ctx: &mut TaskContext) -> Result<()> {
    log_status!("deploy", "Run syncdb for apps");
    ctx.run(&commands::configured_in_venv(&ctx.env, "syncdb_command")?)?;
    Ok(())
}

pub fn migrate(ctx: &mut TaskContext) -> Result<()> {
    log_status!("deploy", "Migrate apps");
    ctx.run(&commands::configured_in_venv(&ctx.env, "migrate_command")?)?;
    Ok(())
}

pub fn cleanup(ctx: &mut TaskContext) -> Result<()> {
    cleanup::run(ctx).map(|_| ())
}

pub fn after_deploy(ctx: &mut TaskContext) -> Result<()> {
    hooks::run_after_deploy(ctx).map(|_| ())
}

pub fn restart_webserver(ctx: &mut TaskContext) -> Result<()> {
    ctx.run(&commands::restart(&ctx.env)?)?;
    Ok(())
}
