//! Runtime configuration read from the environment.
//!
//! `main` loads `.env` with `dotenvy` before calling `Config::from_env`, so
//! values from the file act as defaults under the real environment.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("unsupported DATABASE_URL {0:?}: expected `memory` or a `sqlite:` URL")]
    UnsupportedDatabase(String),
}

/// Storage backend selected by `DATABASE_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    Memory,
    Sqlite(String),
}

impl DatabaseConfig {
    fn parse(url: Option<String>) -> Result<Self, ConfigError> {
        match url.as_deref().map(str::trim) {
            None | Some("") | Some("memory") => Ok(DatabaseConfig::Memory),
            Some(url) if url.starts_with("sqlite:") => Ok(DatabaseConfig::Sqlite(url.to_string())),
            Some(other) => Err(ConfigError::UnsupportedDatabase(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => 3000,
        };
        let database = DatabaseConfig::parse(lookup("DATABASE_URL"))?;
        Ok(Self {
            host,
            port,
            database,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
