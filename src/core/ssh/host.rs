use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// A deploy target in `[user@]host[:port]` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub port: u16,
    #[serde(skip)]
    pub identity_file: Option<String>,
}

impl Host {
    /// Parse a host string; `default_user` fills in a missing `user@`.
    pub fn parse(raw: &str, default_user: Option<&str>) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::config_invalid_value(
                "hosts",
                Some(raw.to_string()),
                "host entries must not be empty",
            ));
        }

        let (user, rest) = match raw.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, raw),
        };

        // IPv6 literals such as ::1 carry colons of their own.
        let (host, port) = match rest.rsplit_once(':') {
            Some((h, p)) if !h.contains(':') && !p.is_empty() => {
                let port = p.parse::<u16>().map_err(|_| {
                    Error::config_invalid_value(
                        "hosts",
                        Some(raw.to_string()),
                        format!("invalid port '{}'", p),
                    )
                })?;
                (h.to_string(), port)
            }
            _ => (rest.to_string(), 22),
        };

        if host.is_empty() {
            return Err(Error::config_invalid_value(
                "hosts",
                Some(raw.to_string()),
                "missing host name",
            ));
        }

        Ok(Self {
            host,
            user: user.or_else(|| default_user.filter(|u| !u.is_empty()).map(str::to_string)),
            port,
            identity_file: None,
        })
    }

    pub fn with_identity_file(mut self, identity_file: Option<&str>) -> Self {
        self.identity_file = identity_file.filter(|p| !p.is_empty()).map(str::to_string);
        self
    }

    /// `user@host` (or just `host`) as passed to ssh.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.destination())?;
        if self.port != 22 {
            write!(f, ":{}", self.port)?;
        }
        Ok(())
    }
}
