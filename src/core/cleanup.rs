//! Removal of old release directories.
//!
//! Releases are ordered lexicographically by identifier, which matches
//! deploy order only because identifiers are fixed-width timestamps.

use serde::Serialize;

use crate::commands;
use crate::context::TaskContext;
use crate::defaults;
use crate::release::{self, ReleaseListing};
use crate::Result;

/// What cleanup decided for one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupPlan {
    pub keep: Vec<String>,
    pub remove: Vec<String>,
    /// Releases outside the kept window that survive because a link
    /// points at them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spared: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResult {
    pub total: usize,
    #[serde(flatten)]
    pub plan: CleanupPlan,
}

/// Keep the `keep` newest releases and anything in `protected`; remove
/// the rest.
pub fn plan(releases: &[String], protected: &[String], keep: usize) -> CleanupPlan {
    let mut sorted: Vec<String> = releases.to_vec();
    sorted.sort();
    sorted.dedup();

    let split = sorted.len().saturating_sub(keep);
    let (old, newest) = sorted.split_at(split);

    let mut result = CleanupPlan {
        keep: newest.to_vec(),
        ..CleanupPlan::default()
    };
    for release in old {
        if protected.contains(release) {
            result.spared.push(release.clone());
        } else {
            result.remove.push(release.clone());
        }
    }
    result
}

pub fn plan_for(listing: &ReleaseListing, keep: usize) -> CleanupPlan {
    plan(&listing.releases, &listing.linked(), keep)
}

/// Clean old releases on the current host.
pub fn run(ctx: &TaskContext) -> Result<CleanupResult> {
    let keep = ctx.env.usize("keep_releases")?.unwrap_or(defaults::KEEP_RELEASES);
    let listing = release::inspect(ctx)?;
    let plan = plan_for(&listing, keep);

    if !plan.remove.is_empty() {
        ctx.run(&commands::remove_releases(&ctx.env, &plan.remove)?)?;
        log_status!(
            "cleanup",
            "Cleaned {} of {} releases",
            plan.remove.len(),
            listing.releases.len()
        );
    }

    Ok(CleanupResult {
        total: listing.releases.len(),
        plan,
    })
}
