//! Getting the code of a release onto a host.
//!
//! Both strategies leave `<vhost_path>/releases/<release>` holding the tree
//! of the commit `git ls-remote` resolves for the configured branch, and
//! record that commit as `rev`.

use regex::Regex;
use std::sync::OnceLock;

use crate::commands;
use crate::context::TaskContext;
use crate::defaults;
use crate::error::{Error, Result, SyncFailedDetails};
use crate::release::ReleaseId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Fetch on the host into a persistent clone and copy it.
    Repository,
    /// Archive the local clone, upload and unpack it.
    Archive,
}

impl Strategy {
    pub fn from_env(ctx: &TaskContext) -> Self {
        if ctx.env.flag("remote_deployment") {
            Strategy::Repository
        } else {
            Strategy::Archive
        }
    }
}

fn ref_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\t\n]").expect("valid separator regex"))
}

/// First field of `git ls-remote` / `git rev-parse` output.
pub fn first_ref(output: &str) -> Option<String> {
    ref_separator()
        .split(output.trim())
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The release being deployed; set by `deploy` before any update runs.
pub fn current_release(ctx: &TaskContext) -> Result<ReleaseId> {
    ReleaseId::parse(ctx.env.require_str("release")?)
}

/// Resolve the branch head on the remote repository and record it as `rev`.
pub fn resolve_remote_rev(ctx: &mut TaskContext) -> Result<String> {
    let command = commands::ls_remote(&ctx.env)?;
    let output = ctx.local_in(&command, &ctx.repo_dir())?;

    let rev = first_ref(&output.stdout).ok_or_else(|| {
        Error::git_command_failed(format!(
            "Branch '{}' not found in {}",
            ctx.env.str("branch").unwrap_or_default(),
            ctx.env.str("repo").unwrap_or_default()
        ))
    })?;

    ctx.env.set("rev", rev.clone());
    Ok(rev)
}

pub fn update(ctx: &mut TaskContext) -> Result<String> {
    match Strategy::from_env(ctx) {
        Strategy::Repository => update_from_repo(ctx),
        Strategy::Archive => update_from_archive(ctx),
    }
}

pub fn update_from_repo(ctx: &mut TaskContext) -> Result<String> {
    let release = current_release(ctx)?;
    log_status!("deploy", "Update code from git");

    let rev = resolve_remote_rev(ctx)?;
    ctx.run(&commands::refresh_cached_copy(&ctx.env, &rev)?)?;
    ctx.run(&commands::copy_cached_copy(&ctx.env, &release)?)?;
    Ok(rev)
}

/// Remote path an archive is uploaded to before unpacking.
pub fn upload_path(release: &ReleaseId) -> String {
    format!("{}/{}", defaults::UPLOAD_DIR, release.archive_name())
}

/// Archive strategy. The local branch must resolve to the remote head;
/// otherwise nothing is archived or uploaded.
pub fn update_from_archive(ctx: &mut TaskContext) -> Result<String> {
    let release = current_release(ctx)?;
    log_status!("deploy", "Create local git snapshot");

    let rev = resolve_remote_rev(ctx)?;
    let repo_dir = ctx.repo_dir();
    let local = ctx.local_in(&commands::rev_parse(&ctx.env)?, &repo_dir)?;
    let local_rev = first_ref(&local.stdout);

    if local_rev.as_deref() != Some(rev.as_str()) {
        return Err(Error::deploy_sync_failed(SyncFailedDetails {
            repo: ctx.env.str("repo").unwrap_or_default().to_string(),
            branch: ctx.env.str("branch").unwrap_or_default().to_string(),
            remote_rev: rev,
            local_rev,
        }));
    }

    let archive = repo_dir.join(release.archive_name());
    ctx.track_artifact(archive.clone());
    ctx.local_in(&commands::git_archive(&ctx.env, &release)?, &repo_dir)?;

    let upload = upload_path(&release);
    ctx.run(&commands::make_release_dir(&ctx.env, &release)?)?;
    ctx.put(&archive, &upload)?;
    ctx.run(&commands::unpack_archive(&ctx.env, &release, &upload)?)?;
    ctx.run(&commands::remove_path(&upload))?;

    std::fs::remove_file(&archive).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("remove {}", archive.display())))
    })?;
    ctx.forget_artifact(&archive);

    Ok(rev)
}
