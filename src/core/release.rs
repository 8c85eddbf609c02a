//! Releases and the remote directory layout.
//!
//! ```text
//! <vhost_path>/
//!   cached-copy/              persistent clone (repository strategy)
//!   config/local_settings.py  linked into every release
//!   releases/
//!     20240105093000/
//!     20240107120000/
//!     current  -> 20240107120000
//!     previous -> 20240105093000
//! ```

use chrono::Local;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::commands;
use crate::context::TaskContext;
use crate::error::{Error, Result};

pub const CURRENT: &str = "current";
pub const PREVIOUS: &str = "previous";
/// Temporary name used while swapping `current` and `previous`.
pub const SWAP: &str = "_previous";

const ID_FORMAT: &str = "%Y%m%d%H%M%S";

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{14}$").expect("valid release id regex"))
}

/// A release identifier: a fixed-width local timestamp (`%Y%m%d%H%M%S`).
///
/// Fixed width is what makes lexicographic order chronological; every
/// ordering decision in cleanup relies on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    pub fn now() -> Self {
        Self(Local::now().format(ID_FORMAT).to_string())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if Self::is_valid(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::validation_invalid_argument(
                "release",
                format!("'{}' is not a release identifier (expected YYYYMMDDHHMMSS)", raw),
                Some(raw.to_string()),
                None,
            ))
        }
    }

    pub fn is_valid(raw: &str) -> bool {
        id_regex().is_match(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local archive name used by the archive strategy.
    pub fn archive_name(&self) -> String {
        format!("{}.tar.gz", self.0)
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Releases present on a host plus where the two links point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseListing {
    /// Release directories, oldest first.
    pub releases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

impl ReleaseListing {
    /// Build a listing from raw `ls` output and `readlink` results.
    pub fn from_raw(ls_output: &str, current: &str, previous: &str) -> Self {
        let mut releases: Vec<String> = ls_output
            .split_whitespace()
            .filter(|entry| ReleaseId::is_valid(entry))
            .map(str::to_string)
            .collect();
        releases.sort();
        releases.dedup();

        Self {
            releases,
            current: link_target(current),
            previous: link_target(previous),
        }
    }

    pub fn newest(&self) -> Option<&str> {
        self.releases.last().map(String::as_str)
    }

    /// Targets of `current` and `previous` that name a release directory.
    pub fn linked(&self) -> Vec<String> {
        [&self.current, &self.previous]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

/// Last path component of a `readlink` result, if any.
fn link_target(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    ReleaseId::is_valid(name).then(|| name.to_string())
}

/// List releases on the current host.
pub fn inspect(ctx: &TaskContext) -> Result<ReleaseListing> {
    let listing = ctx.run(&commands::list_releases(&ctx.env)?)?;
    let current = ctx.run(&commands::read_link(&ctx.env, CURRENT)?)?;
    let previous = ctx.run(&commands::read_link(&ctx.env, PREVIOUS)?)?;

    Ok(ReleaseListing::from_raw(
        &listing.stdout,
        &current.stdout,
        &previous.stdout,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_a_valid_identifier() {
        let id = ReleaseId::now();
        assert!(ReleaseId::is_valid(id.as_str()));
        assert_eq!(id.archive_name(), format!("{}.tar.gz", id));
    }

    #[test]
    fn parse_rejects_non_timestamps() {
        assert!(ReleaseId::parse("20240101120000").is_ok());
        assert!(ReleaseId::parse("current").is_err());
        assert!(ReleaseId::parse("2024010112000").is_err());
        assert!(ReleaseId::parse("../20240101120000").is_err());
    }

    #[test]
    fn listing_ignores_links_and_sorts() {
        let listing = ReleaseListing::from_raw(
            "20240103000000  current  20240101000000\n_previous previous 20240102000000",
            "20240103000000\n",
            "/var/www/vhosts/shop.example.com/releases/20240102000000",
        );

        assert_eq!(
            listing.releases,
            vec!["20240101000000", "20240102000000", "20240103000000"]
        );
        assert_eq!(listing.current.as_deref(), Some("20240103000000"));
        assert_eq!(listing.previous.as_deref(), Some("20240102000000"));
        assert_eq!(listing.newest(), Some("20240103000000"));
        assert_eq!(listing.linked().len(), 2);
    }

    #[test]
    fn link_targets_that_are_not_releases_are_dropped() {
        let listing = ReleaseListing::from_raw("", "", "some-dir");
        assert_eq!(listing.current, None);
        assert_eq!(listing.previous, None);
    }
}
