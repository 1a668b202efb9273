//! Configuration module
//!
//! Connection and API settings consumed read-only at run start. Loaded
//! from a JSON file; [`Config::load`] parses and validates in one step
//! so callers always hold a checked configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::UplinkError;

const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Relational database family. Affects date formatting and string
/// concatenation syntax in generated queries, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    SqlServer,
}

impl Dialect {
    pub fn default_port(&self) -> u16 {
        match self {
            Dialect::MySql => 3306,
            Dialect::SqlServer => 1433,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::MySql => write!(f, "mysql"),
            Dialect::SqlServer => write!(f, "sqlserver"),
        }
    }
}

fn default_db_timeout() -> u64 {
    DEFAULT_DB_CONNECT_TIMEOUT_SECS
}

fn default_api_timeout() -> u64 {
    DEFAULT_API_TIMEOUT_SECS
}

fn default_accept_invalid_certs() -> bool {
    // The platform fronts its endpoints with certificates the operator
    // boxes cannot verify; trust is placed in network-level controls.
    // Deliberate default, not an oversight.
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dialect: Dialect,
    pub host: String,
    /// Defaults to the dialect's standard port.
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_db_timeout")]
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.dialect.default_port())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

impl ApiConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, UplinkError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            UplinkError::Configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_slice(&bytes).map_err(|e| {
            UplinkError::Configuration(format!("cannot parse config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), UplinkError> {
        let mut problems = Vec::new();

        if self.database.host.trim().is_empty() {
            problems.push("database.host must not be empty");
        }
        if self.database.database.trim().is_empty() {
            problems.push("database.database must not be empty");
        }
        if self.database.username.trim().is_empty() {
            problems.push("database.username must not be empty");
        }
        if self.api.base_url.trim().is_empty() {
            problems.push("api.base_url must not be empty");
        } else if !self.api.base_url.starts_with("http://")
            && !self.api.base_url.starts_with("https://")
        {
            problems.push("api.base_url must start with http:// or https://");
        }
        if self.api.username.trim().is_empty() {
            problems.push("api.username must not be empty");
        }
        if self.api.timeout_secs == 0 {
            problems.push("api.timeout_secs must be positive");
        }
        if self.database.connect_timeout_secs == 0 {
            problems.push("database.connect_timeout_secs must be positive");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(UplinkError::Configuration(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "database": {
                "dialect": "mysql",
                "host": "127.0.0.1",
                "username": "reporter",
                "password": "secret",
                "database": "retail"
            },
            "api": {
                "base_url": "https://collect.example.gov/",
                "username": "91532901792864164X",
                "password": "secret"
            }
        }"#
    }

    #[test]
    fn test_defaults_applied() {
        let config: Config = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(config.database.resolved_port(), 3306);
        assert_eq!(config.database.connect_timeout_secs, 10);
        assert_eq!(config.api.timeout_secs, 30);
        assert!(config.api.accept_invalid_certs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config: Config = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(config.api.base_url(), "https://collect.example.gov");
    }

    #[test]
    fn test_sqlserver_default_port() {
        let json = sample_json().replace("mysql", "sqlserver");
        let config: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config.database.resolved_port(), 1433);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let json = sample_json().replace("https://collect.example.gov/", "collect.example.gov");
        let config: Config = serde_json::from_str(&json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let err = Config::load("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, UplinkError::Configuration(_)));
    }
}
