#![deny(unsafe_code)]

//! Configuration loading and validation for hapadmin.
//!
//! Loads TOML configuration files describing where the HAProxy stats
//! sockets live and how hard to try when talking to them. Provides the
//! [`AppConfig`] type as the central configuration structure.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the stats sockets are and how to talk to them.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How many times a failed command is retried.
///
/// Accepts either an integer count or the keywords `"none"` / `"forever"`:
///
/// ```toml
/// retry = 3          # up to 4 attempts
/// retry = 0          # retry forever
/// retry = "none"     # a single attempt
/// retry = "forever"  # same as 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetrySetting {
    Count(u32),
    Keyword(RetryKeyword),
}

/// Keyword spellings of [`RetrySetting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryKeyword {
    /// Exactly one attempt.
    #[serde(rename = "none")]
    Never,
    /// Keep trying until the daemon answers.
    Forever,
}

impl Default for RetrySetting {
    fn default() -> Self {
        Self::Count(2)
    }
}

/// Stats socket connection settings.
///
/// ## TOML Example
///
/// ```toml
/// [connection]
/// socket_dir = "/run/haproxy"
/// retry = 2
/// retry_interval_ms = 2000
/// timeout_ms = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Directory scanned for one stats socket per HAProxy process.
    #[serde(default)]
    pub socket_dir: Option<String>,

    /// A single stats socket file.
    #[serde(default)]
    pub socket_file: Option<String>,

    /// TCP stats endpoints as `host:port`.
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Retry policy for failed commands.
    #[serde(default)]
    pub retry: RetrySetting,

    /// Sleep between two attempts, in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Upper bound for one attempt (connect, send and read), in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_dir: None,
            socket_file: None,
            addresses: Vec::new(),
            retry: RetrySetting::default(),
            retry_interval_ms: default_retry_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_retry_interval_ms() -> u64 {
    2000
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Split a `host:port` string, rejecting empty hosts and zero or
/// non-numeric ports. IPv6 hosts may be bracketed (`[::1]:9999`).
pub fn split_host_port(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some((host.to_string(), port)),
    }
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let conn = &self.connection;
        if conn.socket_dir.is_some() && conn.socket_file.is_some() {
            return Err(ConfigError::Validation(
                "connection.socket_dir and connection.socket_file are mutually exclusive"
                    .to_string(),
            ));
        }
        if conn.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "connection.timeout_ms must be non-zero".to_string(),
            ));
        }
        for (i, address) in conn.addresses.iter().enumerate() {
            if split_host_port(address).is_none() {
                return Err(ConfigError::Validation(format!(
                    "connection.addresses[{i}] must be host:port with a non-zero port, got {address:?}"
                )));
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }

    /// Whether any endpoint source (directory, file or TCP address) is set.
    pub fn has_endpoint_source(&self) -> bool {
        self.connection.socket_dir.is_some()
            || self.connection.socket_file.is_some()
            || !self.connection.addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.connection.retry, RetrySetting::Count(2));
        assert_eq!(config.connection.retry_interval_ms, 2000);
        assert_eq!(config.connection.timeout_ms, 1000);
        assert_eq!(config.logging.level, "info");
        assert!(!config.has_endpoint_source());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.connection.timeout_ms, 1000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [connection]
            socket_dir = "/run/haproxy"
            retry = 5
            retry_interval_ms = 250
            timeout_ms = 3000

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.connection.socket_dir.as_deref(), Some("/run/haproxy"));
        assert_eq!(config.connection.retry, RetrySetting::Count(5));
        assert_eq!(config.connection.retry_interval_ms, 250);
        assert_eq!(config.connection.timeout_ms, 3000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.has_endpoint_source());
    }

    #[test]
    fn test_retry_keywords() {
        let config = AppConfig::parse("[connection]\nretry = \"none\"\n").unwrap();
        assert_eq!(
            config.connection.retry,
            RetrySetting::Keyword(RetryKeyword::Never)
        );

        let config = AppConfig::parse("[connection]\nretry = \"forever\"\n").unwrap();
        assert_eq!(
            config.connection.retry,
            RetrySetting::Keyword(RetryKeyword::Forever)
        );

        let config = AppConfig::parse("[connection]\nretry = 0\n").unwrap();
        assert_eq!(config.connection.retry, RetrySetting::Count(0));
    }

    #[test]
    fn test_retry_rejects_unknown_keyword() {
        let result = AppConfig::parse("[connection]\nretry = \"sometimes\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_rejects_dir_and_file() {
        let toml = r#"
            [connection]
            socket_dir = "/run/haproxy"
            socket_file = "/run/haproxy/admin.sock"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let toml = r#"
            [connection]
            timeout_ms = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_addresses_from_toml() {
        let toml = r#"
            [connection]
            addresses = ["127.0.0.1:9999", "[::1]:10000"]
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.connection.addresses.len(), 2);
        assert!(config.has_endpoint_source());
    }

    #[test]
    fn test_validation_rejects_bad_address() {
        for bad in ["localhost", "localhost:0", ":9999", "host:port"] {
            let toml = format!("[connection]\naddresses = [\"{bad}\"]\n");
            assert!(AppConfig::parse(&toml).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("10.0.0.1:9999"),
            Some(("10.0.0.1".to_string(), 9999))
        );
        assert_eq!(split_host_port("[::1]:80"), Some(("::1".to_string(), 80)));
        assert_eq!(split_host_port("nohost"), None);
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let toml = r#"
            [logging]
            level = "chatty"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let toml = r#"
            [connection]
            socket_file = "/run/haproxy/admin.sock"
            retry = "none"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let reparsed = AppConfig::parse(&rendered).unwrap();
        assert_eq!(reparsed.connection.retry, config.connection.retry);
        assert_eq!(reparsed.connection.socket_file, config.connection.socket_file);
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hapadmin.toml");
        tokio::fs::write(
            &path,
            b"[connection]\nsocket_file = \"/run/haproxy.sock\"\ntimeout_ms = 500\n",
        )
        .await
        .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(
            config.connection.socket_file.as_deref(),
            Some("/run/haproxy.sock")
        );
        assert_eq!(config.connection.timeout_ms, 500);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[")
            .await
            .unwrap();

        let result = AppConfig::load(&path).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
