//! Harness configuration
//!
//! Environment Variables:
//! - `SQLPROBE_HOST` - Server host (default `127.0.0.1`)
//! - `SQLPROBE_PORT` - Server port (default `6030`)
//! - `SQLPROBE_USER` - User name (default `root`)
//! - `SQLPROBE_PASSWORD` - Password
//! - `SQLPROBE_PASSWORD_FILE` - Read password from file when `SQLPROBE_PASSWORD` is unset
//! - `SQLPROBE_TIMEOUT_MS` - Per-statement timeout (default 30000)
//! - `SQLPROBE_DB_PREFIX` - Prefix of per-session database names (default `probe`)
//! - `SQLPROBE_FLUSH_SQL` - Flush statement, `{database}` is substituted

use std::env;
use std::fs;
use std::time::Duration;

use thiserror::Error;

use crate::driver::{Credentials, Endpoint, DEFAULT_FLUSH_TEMPLATE};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6030;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DB_PREFIX: &str = "sqltest";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
    #[error("cannot read {path}: {message}")]
    PasswordFile { path: String, message: String },
}

/// Connection and session settings
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    pub statement_timeout: Duration,
    pub db_prefix: String,
    pub flush_sql: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new(DEFAULT_HOST, DEFAULT_PORT),
            credentials: Credentials::new(DEFAULT_USER, None),
            statement_timeout: DEFAULT_TIMEOUT,
            db_prefix: DEFAULT_DB_PREFIX.to_string(),
            flush_sql: DEFAULT_FLUSH_TEMPLATE.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Read configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("SQLPROBE_HOST").unwrap_or(defaults.endpoint.host);
        let port = parse_var(&lookup, "SQLPROBE_PORT")?.unwrap_or(defaults.endpoint.port);
        let user = lookup("SQLPROBE_USER").unwrap_or(defaults.credentials.user);

        // Priority: direct password > file
        let password = match lookup("SQLPROBE_PASSWORD") {
            Some(pwd) => Some(pwd),
            None => match lookup("SQLPROBE_PASSWORD_FILE") {
                Some(path) => {
                    let content = fs::read_to_string(&path).map_err(|e| ConfigError::PasswordFile {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                    Some(content.trim().to_string())
                }
                None => None,
            },
        };

        let statement_timeout = parse_var::<u64, _>(&lookup, "SQLPROBE_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.statement_timeout);
        if statement_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SQLPROBE_TIMEOUT_MS".to_string(),
                value: "0".to_string(),
            });
        }

        let db_prefix = lookup("SQLPROBE_DB_PREFIX").unwrap_or(defaults.db_prefix);
        if db_prefix.is_empty() || !db_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid {
                var: "SQLPROBE_DB_PREFIX".to_string(),
                value: db_prefix,
            });
        }

        Ok(Self {
            endpoint: Endpoint::new(host, port),
            credentials: Credentials::new(user, password),
            statement_timeout,
            db_prefix,
            flush_sql: lookup("SQLPROBE_FLUSH_SQL").unwrap_or(defaults.flush_sql),
        })
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var: var.to_string(),
                value,
            }),
    }
}
