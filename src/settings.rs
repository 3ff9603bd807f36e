//! Runtime settings read from the environment.

use crate::error::ConfigError;
use regex::Regex;
use std::net::SocketAddr;
use std::sync::OnceLock;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/onset";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SCHEMA: &str = "onset";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// PostgreSQL schema holding every table and enum type.
    pub schema: String,
    pub max_connections: u32,
    pub body_limit: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build settings from any variable source; unset or blank variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into());
        let bind_addr = parse("BIND_ADDR", get("BIND_ADDR"), DEFAULT_BIND_ADDR)?;
        let schema = get("ONSET_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.into());
        if !schema_name_regex().is_match(&schema) {
            return Err(ConfigError::Env {
                var: "ONSET_SCHEMA",
                message: format!("'{}' is not a lower-case identifier", schema),
            });
        }
        let max_connections = parse("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Env {
                var: "DB_MAX_CONNECTIONS",
                message: "must be at least 1".into(),
            });
        }
        let body_limit = parse("BODY_LIMIT_BYTES", get("BODY_LIMIT_BYTES"), DEFAULT_BODY_LIMIT)?;

        Ok(Settings {
            database_url,
            bind_addr,
            schema,
            max_connections,
            body_limit,
        })
    }
}

fn parse<T, D>(var: &'static str, raw: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    D: ToString,
{
    let raw = raw.unwrap_or_else(|| default.to_string());
    raw.parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        message: format!("'{}': {}", raw, e),
    })
}

fn schema_name_regex() -> &'static Regex {
    static SCHEMA: OnceLock<Regex> = OnceLock::new();
    SCHEMA.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static schema pattern compiles"))
}
