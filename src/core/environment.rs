//! The configuration store every task reads from and writes to.
//!
//! An [`Environment`] is created once per process (seeded with defaults and
//! project globals), handed to each task in turn, and dropped at exit.
//! Nothing here is global: tests build their own environments.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::defaults;
use crate::error::{Error, Result};
use crate::utils::{shell, template};

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl Value {
    /// Convert an arbitrary JSON value. Numbers become strings; nested
    /// objects and non-string array items are rejected.
    pub fn from_json(key: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
            serde_json::Value::Number(n) => Ok(Value::Str(n.to_string())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s.clone()),
                    serde_json::Value::Number(n) => Ok(n.to_string()),
                    other => Err(Error::config_invalid_value(
                        key,
                        Some(other.to_string()),
                        "list items must be strings",
                    )),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            other => Err(Error::config_invalid_value(
                key,
                Some(other.to_string()),
                "expected a string, list of strings or boolean",
            )),
        }
    }

    /// Whether the value counts as unset for `require`.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Bool(_) => false,
            Value::Str(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
        }
    }

    /// Text used when the value is interpolated into a command.
    pub fn as_text(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => items.join(" "),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Environment {
    values: BTreeMap<String, Value>,
    /// Names of the environment-selection tasks, quoted in missing-key hints.
    #[serde(skip)]
    provided_by: Vec<String>,
    /// Keys whose value came from [`Environment::derive`] rather than an
    /// explicit setting; these follow their inputs on every derive.
    #[serde(skip)]
    derived: BTreeSet<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment holding the built-in defaults.
    pub fn with_defaults() -> Self {
        let mut env = Self::new();
        for (key, value) in defaults::base_values() {
            env.set(key, value);
        }
        env
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.derived.remove(&key);
        self.values.insert(key, value.into());
    }

    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_blank())
    }

    pub fn set_provided_by(&mut self, environments: Vec<String>) {
        self.provided_by = environments;
    }

    pub fn provided_by(&self) -> &[String] {
        &self.provided_by
    }

    /// Fail with one error naming every key that is unset or blank.
    pub fn require(&self, keys: &[&str]) -> Result<()> {
        let missing: Vec<String> = keys
            .iter()
            .filter(|k| !self.is_set(k))
            .map(|k| k.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::config_missing_keys(missing, self.provided_by.clone()))
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::Str(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(Value::Str(s)) if !s.trim().is_empty() => Ok(s.as_str()),
            Some(Value::Str(_)) | None => Err(Error::config_missing_keys(
                vec![key.to_string()],
                self.provided_by.clone(),
            )),
            Some(other) => Err(Error::config_invalid_value(
                key,
                Some(other.as_text()),
                "expected a string",
            )),
        }
    }

    /// List value; a plain string is split on whitespace.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::List(items)) => items.clone(),
            Some(Value::Str(s)) => s.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Str(s)) => matches!(s.trim(), "true" | "1" | "yes" | "on"),
            _ => false,
        }
    }

    pub fn usize(&self, key: &str) -> Result<Option<usize>> {
        match self.str(key) {
            Some(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
                Error::config_invalid_value(key, Some(raw.to_string()), "expected a whole number")
            }),
            None => Ok(None),
        }
    }

    /// Merge a settings map over the current values.
    pub fn merge(&mut self, settings: &BTreeMap<String, Value>) {
        for (key, value) in settings {
            self.set(key.clone(), value.clone());
        }
    }

    /// Fill derived keys (`repo`, `vhost_path`, ...) that were not set
    /// explicitly. Earlier derived values are recomputed from the current
    /// inputs, and dropped when an input is gone.
    pub fn derive(&mut self) {
        for (key, tmpl) in defaults::derived_templates() {
            if self.is_set(key) && !self.derived.contains(*key) {
                continue;
            }
            match self.render(tmpl) {
                Ok(value) => {
                    self.values.insert(key.to_string(), Value::Str(value));
                    self.derived.insert(key.to_string());
                }
                Err(_) => {
                    if self.derived.remove(*key) {
                        self.values.remove(*key);
                    }
                }
            }
        }
    }

    /// Render `{{key}}` placeholders; any unset key is a configuration error.
    pub fn render(&self, tmpl: &str) -> Result<String> {
        template::render_strict(tmpl, |key| {
            self.get(key).filter(|v| !v.is_blank()).map(Value::as_text)
        })
        .map_err(|missing| Error::config_missing_keys(missing, self.provided_by.clone()))
    }

    /// Render a shell command template, quoting each substituted value that
    /// contains shell metacharacters.
    pub fn render_shell(&self, tmpl: &str) -> Result<String> {
        template::render_strict(tmpl, |key| {
            self.get(key)
                .filter(|v| !v.is_blank())
                .map(|v| shell::quote_arg(&v.as_text()))
        })
        .map_err(|missing| Error::config_missing_keys(missing, self.provided_by.clone()))
    }
}
