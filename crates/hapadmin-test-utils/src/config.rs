//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use hapadmin_config::{AppConfig, RetryKeyword, RetrySetting};

/// Fluent builder for [`AppConfig`] in tests.
///
/// Starts from the defaults with retries disabled and short timeouts so a
/// failing test does not sit in backoff.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_dir(cluster.dir())
///     .timeout_ms(200)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.connection.retry = RetrySetting::Keyword(RetryKeyword::Never);
        config.connection.retry_interval_ms = 10;
        config.connection.timeout_ms = 500;
        Self { config }
    }

    pub fn socket_dir(mut self, dir: &Path) -> Self {
        self.config.connection.socket_dir = Some(dir.display().to_string());
        self
    }

    pub fn socket_file(mut self, path: &Path) -> Self {
        self.config.connection.socket_file = Some(path.display().to_string());
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.config.connection.addresses.push(address.to_string());
        self
    }

    pub fn retry(mut self, retry: RetrySetting) -> Self {
        self.config.connection.retry = retry;
        self
    }

    pub fn retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.connection.retry_interval_ms = ms;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.connection.timeout_ms = ms;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
