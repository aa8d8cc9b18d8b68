//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/optimist/config.toml)
//! 3. Environment variables (OPTIMIST_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "OPTIMIST";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (the widget database)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Retry and backoff policy for synced operations
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Behaviour of the local SQLite remote
    #[serde(default)]
    pub remote: RemoteSettings,
}

/// Retry and backoff policy shared by mutations and creations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// First backoff delay
    pub initial_delay_ms: u64,
    /// Backoff ceiling (before jitter)
    pub max_delay_ms: u64,
    /// Total attempts including the first
    pub max_attempts: u32,
    /// How long a failed creation stays visible before it is removed
    pub removal_grace_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 10_000,
            max_attempts: 3,
            removal_grace_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn removal_grace(&self) -> Duration {
        Duration::from_millis(self.removal_grace_ms)
    }

    /// Attempts actually made; zero is treated as one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Latency and failure injection for the SQLite remote
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Artificial delay added to every call
    pub latency_ms: u64,
    /// Probability (0.0 to 1.0) that a call fails
    pub failure_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retry: RetryPolicy::default(),
            remote: RemoteSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (OPTIMIST_DATA_DIR, OPTIMIST_MAX_ATTEMPTS, ...)
    /// 2. Config file (~/.config/optimist/config.toml or OPTIMIST_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = env_var("MAX_ATTEMPTS") {
            self.retry.max_attempts = val
                .parse()
                .with_context(|| format!("Invalid {}_MAX_ATTEMPTS: {:?}", ENV_PREFIX, val))?;
        }

        if let Some(val) = env_var("LATENCY_MS") {
            self.remote.latency_ms = val
                .parse()
                .with_context(|| format!("Invalid {}_LATENCY_MS: {:?}", ENV_PREFIX, val))?;
        }

        if let Some(val) = env_var("FAILURE_RATE") {
            let rate: f64 = val
                .parse()
                .with_context(|| format!("Invalid {}_FAILURE_RATE: {:?}", ENV_PREFIX, val))?;
            self.remote.failure_rate = rate.clamp(0.0, 1.0);
        }

        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Load from an explicit path if given, otherwise from the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with OPTIMIST_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("optimist")
            .join("config.toml")
    }

    /// Get the path to the widget database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("widgets.sqlite3")
    }
}

/// Read `OPTIMIST_<name>`, treating an empty value as unset
fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name))
        .ok()
        .filter(|val| !val.is_empty())
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("optimist")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "OPTIMIST_DATA_DIR",
        "OPTIMIST_MAX_ATTEMPTS",
        "OPTIMIST_LATENCY_MS",
        "OPTIMIST_FAILURE_RATE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.data_dir.ends_with("optimist"));
        assert_eq!(config.retry.initial_delay(), Duration::from_millis(250));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.removal_grace(), Duration::from_secs(1));
        assert_eq!(config.remote, RemoteSettings::default());
    }

    #[test]
    fn test_database_path() {
        let config = Config::default();
        assert!(config.database_path().ends_with("widgets.sqlite3"));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);
        let mut config = Config::default();

        env::set_var("OPTIMIST_DATA_DIR", "/tmp/optimist-test");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/optimist-test"));
    }

    #[test]
    fn test_env_override_retry_and_remote() {
        let _guard = EnvGuard::new(ENV_VARS);
        let mut config = Config::default();

        env::set_var("OPTIMIST_MAX_ATTEMPTS", "5");
        env::set_var("OPTIMIST_LATENCY_MS", "1000");
        env::set_var("OPTIMIST_FAILURE_RATE", "7");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.remote.latency_ms, 1000);
        assert_eq!(config.remote.failure_rate, 1.0);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let _guard = EnvGuard::new(ENV_VARS);
        let mut config = Config::default();

        env::set_var("OPTIMIST_MAX_ATTEMPTS", "three");
        let err = config.apply_env_overrides().unwrap_err();
        assert!(err.to_string().contains("OPTIMIST_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/optimist"),
            retry: RetryPolicy {
                max_attempts: 4,
                ..RetryPolicy::default()
            },
            remote: RemoteSettings {
                latency_ms: 1000,
                failure_rate: 0.5,
            },
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("[retry]"));
        assert!(toml_str.contains("[remote]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_str_partial_sections() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"

            [retry]
            max_attempts = 5

            [remote]
            latency_ms = 1000
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.remote.latency_ms, 1000);
        assert_eq!(config.remote.failure_rate, 0.0);
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            retry: RetryPolicy {
                removal_grace_ms: 5_000,
                ..RetryPolicy::default()
            },
            remote: RemoteSettings::default(),
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        env::set_var("OPTIMIST_DATA_DIR", temp_dir.path().join("data"));

        let path = temp_dir.path().join("missing.toml");
        let config = Config::load_from_path(&path).unwrap();

        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.data_dir.exists());
    }
}
