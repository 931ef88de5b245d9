//! Sync configuration module
//!
//! Tunables of the offline layer: storage namespace, reconnection backoff,
//! read retries, banner timings and the local login lockout. Values can be
//! built in code with [`SyncConfigBuilder`] or loaded from a TOML file whose
//! durations are expressed in milliseconds.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default durable storage namespace prefix
pub const DEFAULT_NAMESPACE: &str = "dashboard_";

/// Reconnection backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay of the first attempt, doubled on each further attempt
    pub base: Duration,
    /// Upper bound of the doubled delay
    pub cap: Duration,
    /// Random jitter is drawn from `[0, jitter_max)`
    pub jitter_max: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            jitter_max: Duration::from_secs(1),
        }
    }
}

/// Automatic retries of remote calls made while online
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRetryConfig {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Retry *n* waits `n * step`
    pub step: Duration,
}

impl Default for FetchRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            step: Duration::from_secs(2),
        }
    }
}

/// Client-side login lockout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutConfig {
    pub max_attempts: u32,
    pub duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            duration: Duration::from_secs(5 * 60),
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Remote document service base URL
    pub server_url: Option<String>,
    /// Prefix of every durable storage key
    pub namespace: String,
    pub reconnect: ReconnectConfig,
    pub fetch_retry: FetchRetryConfig,
    /// How long the "back online" banner stays visible
    pub reconnected_banner: Duration,
    /// How long the welcome banner stays visible
    pub welcome_banner: Duration,
    pub lockout: LockoutConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            reconnect: ReconnectConfig::default(),
            fetch_retry: FetchRetryConfig::default(),
            reconnected_banner: Duration::from_secs(3),
            welcome_banner: Duration::from_secs(5),
            lockout: LockoutConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::MissingValue("namespace"));
        }
        if self.reconnect.base.is_zero() {
            return Err(ConfigError::Invalid(
                "reconnect base delay must be positive".to_string(),
            ));
        }
        if self.reconnect.base > self.reconnect.cap {
            return Err(ConfigError::Invalid(format!(
                "reconnect base {:?} exceeds cap {:?}",
                self.reconnect.base, self.reconnect.cap
            )));
        }
        if self.lockout.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "lockout needs at least one attempt".to_string(),
            ));
        }
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        Ok(())
    }

    /// Storage key for `name` under the configured namespace
    pub fn storage_key(&self, name: &str) -> String {
        format!("{}{}", self.namespace, name)
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.into_builder().build()
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = Some(url.into());
        self
    }

    /// Set the storage namespace prefix
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the reconnection backoff
    pub fn reconnect(mut self, base: Duration, cap: Duration, jitter_max: Duration) -> Self {
        self.config.reconnect = ReconnectConfig {
            base,
            cap,
            jitter_max,
        };
        self
    }

    /// Set read/write retry behaviour while online
    pub fn fetch_retry(mut self, max_retries: u32, step: Duration) -> Self {
        self.config.fetch_retry = FetchRetryConfig { max_retries, step };
        self
    }

    /// Set banner durations
    pub fn banners(mut self, reconnected: Duration, welcome: Duration) -> Self {
        self.config.reconnected_banner = reconnected;
        self.config.welcome_banner = welcome;
        self
    }

    /// Set the login lockout policy
    pub fn lockout(mut self, max_attempts: u32, duration: Duration) -> Self {
        self.config.lockout = LockoutConfig {
            max_attempts,
            duration,
        };
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// On-disk representation; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    server_url: Option<String>,
    namespace: Option<String>,
    reconnect_base_ms: Option<u64>,
    reconnect_cap_ms: Option<u64>,
    reconnect_jitter_ms: Option<u64>,
    fetch_max_retries: Option<u32>,
    fetch_retry_step_ms: Option<u64>,
    reconnected_banner_ms: Option<u64>,
    welcome_banner_ms: Option<u64>,
    lockout_max_attempts: Option<u32>,
    lockout_duration_ms: Option<u64>,
}

impl ConfigFile {
    fn into_builder(self) -> SyncConfigBuilder {
        let defaults = SyncConfig::default();
        let ms = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };

        let mut builder = SyncConfig::builder()
            .namespace(self.namespace.unwrap_or(defaults.namespace))
            .reconnect(
                ms(self.reconnect_base_ms, defaults.reconnect.base),
                ms(self.reconnect_cap_ms, defaults.reconnect.cap),
                ms(self.reconnect_jitter_ms, defaults.reconnect.jitter_max),
            )
            .fetch_retry(
                self.fetch_max_retries
                    .unwrap_or(defaults.fetch_retry.max_retries),
                ms(self.fetch_retry_step_ms, defaults.fetch_retry.step),
            )
            .banners(
                ms(self.reconnected_banner_ms, defaults.reconnected_banner),
                ms(self.welcome_banner_ms, defaults.welcome_banner),
            )
            .lockout(
                self.lockout_max_attempts
                    .unwrap_or(defaults.lockout.max_attempts),
                ms(self.lockout_duration_ms, defaults.lockout.duration),
            );
        if let Some(url) = self.server_url {
            builder = builder.server_url(url);
        }
        builder
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("failed to read configuration: {0}")]
    Io(String),
}
