use crate::shared::config::{ConfigError, SyncConfig, SyncConfigBuilder};
use std::path::{Path, PathBuf};

/// Default server URL
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Client configuration: sync settings plus where the local database lives.
///
/// Environment overrides:
/// - `COMMUNITY_SYNC_CONFIG`: TOML file loaded before the other overrides
/// - `CLIENT_API_URL`: document service URL
/// - `COMMUNITY_SYNC_DB`: SQLite file path
/// - `COMMUNITY_SYNC_NAMESPACE`: storage key prefix
#[derive(Debug, Clone, Default)]
pub struct Config {
    sync: SyncConfig,
    database_path: Option<PathBuf>,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration from `lookup`, which maps variable names to values
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sync = match lookup("COMMUNITY_SYNC_CONFIG") {
            Some(path) => SyncConfig::load(path)?,
            None => SyncConfig::default(),
        };
        if let Some(url) = lookup("CLIENT_API_URL") {
            sync.server_url = Some(url);
        }
        if let Some(namespace) = lookup("COMMUNITY_SYNC_NAMESPACE") {
            sync.namespace = namespace;
        }
        sync.validate()?;

        Ok(Self {
            sync,
            database_path: lookup("COMMUNITY_SYNC_DB").map(PathBuf::from),
        })
    }

    pub fn with_builder(builder: SyncConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self {
            sync: builder.build()?,
            database_path: None,
        })
    }

    pub fn sync(&self) -> &SyncConfig {
        &self.sync
    }

    pub fn server_url(&self) -> &str {
        self.sync.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url().trim_end_matches('/'), path)
    }

    /// SQLite file override, if any
    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }

    pub fn set_database_path(&mut self, path: impl Into<PathBuf>) {
        self.database_path = Some(path.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert_eq!(config.server_url(), "http://127.0.0.1:3000");
        assert!(config.database_path().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("CLIENT_API_URL", "https://community.example.com/"),
            ("COMMUNITY_SYNC_DB", "/tmp/community.db"),
            ("COMMUNITY_SYNC_NAMESPACE", "test_"),
        ]))
        .unwrap();

        assert_eq!(config.api_url("/v1/posts"), "https://community.example.com/v1/posts");
        assert_eq!(config.database_path(), Some(Path::new("/tmp/community.db")));
        assert_eq!(config.sync().storage_key("posts"), "test_posts");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = Config::from_lookup(lookup(&[("CLIENT_API_URL", "ftp://nope")]));
        assert_eq!(result.unwrap_err(), ConfigError::InvalidUrl("ftp://nope".to_string()));
    }

    #[test]
    fn test_config_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace = \"file_\"\nreconnect_cap_ms = 30000").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = Config::from_lookup(lookup(&[
            ("COMMUNITY_SYNC_CONFIG", path.as_str()),
            ("COMMUNITY_SYNC_NAMESPACE", "env_"),
        ]))
        .unwrap();

        assert_eq!(config.sync().namespace, "env_");
        assert_eq!(config.sync().reconnect.cap, std::time::Duration::from_secs(30));
    }
}
