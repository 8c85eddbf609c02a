//! Project configuration: global settings plus named environments.
//!
//! ```json
//! {
//!   "project_name": "shop",
//!   "git_host": "git.example.com",
//!   "environments": {
//!     "dev":  { "user": "deploy", "branch": "develop", "hosts": ["dev.example.com"], "host_name": "dev.example.com" },
//!     "prod": { "user": "deploy", "branch": "master",  "hosts": ["web1", "web2"],    "host_name": "example.com" }
//!   }
//! }
//! ```
//!
//! Every top-level key except `environments` is a global seeded into the
//! [`Environment`] at startup. Each environment becomes a selection task of
//! the same name.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::environment::{Environment, Value};
use crate::error::{Error, Result};
use crate::paths;

pub type Settings = BTreeMap<String, Value>;

const ENVIRONMENTS_KEY: &str = "environments";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub globals: Settings,
    pub environments: BTreeMap<String, Settings>,
}

impl ProjectConfig {
    /// Parse a project file's contents. `origin` is only used in errors.
    pub fn parse(raw: &str, origin: &str) -> Result<Self> {
        let root: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| Error::config_invalid_json(origin, e))?;

        let object = root.as_object().ok_or_else(|| {
            Error::config_invalid_value(origin, None, "project file must contain a JSON object")
        })?;

        let mut globals = Settings::new();
        let mut environments = BTreeMap::new();

        for (key, value) in object {
            if key == ENVIRONMENTS_KEY {
                environments = parse_environments(value)?;
                continue;
            }
            globals.insert(key.clone(), Value::from_json(key, value)?);
        }

        Ok(Self {
            path: None,
            globals,
            environments,
        })
    }

    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    /// Build the process environment: built-in defaults, then globals.
    pub fn seed(&self) -> Environment {
        let mut env = Environment::with_defaults();
        env.merge(&self.globals);
        env.set_provided_by(self.environment_names());
        env
    }

    /// Apply a named environment over `env` and fill derived keys.
    pub fn select(&self, name: &str, env: &mut Environment) -> Result<()> {
        let settings = self.environments.get(name).ok_or_else(|| {
            Error::validation_invalid_argument(
                "environment",
                format!("Unknown environment '{}'", name),
                Some(name.to_string()),
                Some(self.environment_names()),
            )
        })?;

        env.merge(settings);
        env.set("environment", name);
        env.derive();
        Ok(())
    }
}

fn parse_environments(value: &serde_json::Value) -> Result<BTreeMap<String, Settings>> {
    let object = value.as_object().ok_or_else(|| {
        Error::config_invalid_value(ENVIRONMENTS_KEY, None, "expected an object of environments")
    })?;

    let mut environments = BTreeMap::new();
    for (name, settings) in object {
        let settings_obj = settings.as_object().ok_or_else(|| {
            Error::config_invalid_value(
                format!("{}.{}", ENVIRONMENTS_KEY, name),
                None,
                "expected an object of settings",
            )
        })?;

        let mut parsed = Settings::new();
        for (key, value) in settings_obj {
            parsed.insert(key.clone(), Value::from_json(key, value)?);
        }
        environments.insert(name.clone(), parsed);
    }

    Ok(environments)
}

/// Load the project file.
///
/// An explicit path must exist. Otherwise `./limeship.json` is tried, then
/// the global file under the config directory; with neither present the
/// project is empty and tasks fail on their first required key.
pub fn load(explicit: Option<&str>, cwd: &Path) -> Result<ProjectConfig> {
    if let Some(raw_path) = explicit {
        let path = paths::expand(raw_path);
        if !path.is_file() {
            return Err(Error::project_config_not_found(path.display().to_string()));
        }
        return read(&path);
    }

    let local = paths::project_file_in(cwd);
    if local.is_file() {
        return read(&local);
    }

    if let Ok(global) = paths::global_project_file() {
        if global.is_file() {
            return read(&global);
        }
    }

    Ok(ProjectConfig::default())
}

fn read(path: &Path) -> Result<ProjectConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;
    let mut config = ProjectConfig::parse(&raw, &path.display().to_string())?;
    config.path = Some(path.to_path_buf());
    Ok(config)
}
