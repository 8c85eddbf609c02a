//! String template rendering utilities.
//!
//! Templates use `{{key}}` placeholders. [`render_strict`] refuses to
//! produce output while any placeholder is unresolved.

use regex::Regex;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid placeholder regex"))
}

/// Render every placeholder through `lookup`.
///
/// Returns the names of all unresolved keys (deduplicated, in order of first
/// appearance) instead of a partially rendered string.
pub fn render_strict<F>(template: &str, lookup: F) -> std::result::Result<String, Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Vec<String> = Vec::new();
    let rendered = placeholder_regex().replace_all(template, |caps: &regex::Captures| {
        let key = &caps[1];
        match lookup(key) {
            Some(value) => value,
            None => {
                if !missing.iter().any(|m| m == key) {
                    missing.push(key.to_string());
                }
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(missing)
    }
}
