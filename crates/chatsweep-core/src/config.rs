//! Engine configuration.
//!
//! Every section has defaults, so a config file only needs the keys it
//! changes. Files are JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chatsweep_remote::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Application directory name under the platform config/data dirs.
const APP_DIR: &str = "chatsweep";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Remote client settings.
    pub client: ClientConfig,
    /// Scan session settings.
    pub session: SessionConfig,
    /// Batch delete settings.
    pub delete: DeleteConfig,
    /// Bulk connect settings.
    pub connect: ConnectConfig,
    /// SQLite database path (defaults to the platform data dir).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Loads configuration, falling back to defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Writes configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default config file location (`<config dir>/chatsweep/config.json`).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
    }

    /// Resolves the database path.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the platform has no data
    /// directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("chatsweep.db"))
            .ok_or_else(|| Error::Config("no data directory available".to_string()))
    }
}

/// Scan session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval of the status poll.
    pub poll_interval: Duration,
    /// Timeout for a single remote command or poll.
    pub request_timeout: Duration,
    /// How long `stop()` waits for the remote acknowledgement.
    pub stop_timeout: Duration,
    /// Fixed delay between stream reconnect attempts.
    pub reconnect_backoff: Duration,
    /// Reconnect attempts before falling back to poll-only mode.
    pub max_reconnect_attempts: u32,
    /// Forward `pause()`/`resume()` to the remote service.
    pub forward_pause: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(15),
            stop_timeout: Duration::from_secs(10),
            reconnect_backoff: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            forward_pause: false,
        }
    }
}

impl SessionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the stop acknowledgement timeout.
    #[must_use]
    pub const fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sets the reconnect backoff and attempt count.
    #[must_use]
    pub const fn reconnect(mut self, backoff: Duration, max_attempts: u32) -> Self {
        self.reconnect_backoff = backoff;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Enables or disables forwarding of pause/resume.
    #[must_use]
    pub const fn forward_pause(mut self, enabled: bool) -> Self {
        self.forward_pause = enabled;
        self
    }
}

/// Batch delete settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteConfig {
    /// Time window passed to the verification request.
    pub verify_window_minutes: u32,
    /// Timeout for a single delete or verify request.
    pub request_timeout: Duration,
    /// Lower bound of the retry jitter.
    pub retry_jitter_min: Duration,
    /// Upper bound of the retry jitter.
    pub retry_jitter_max: Duration,
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            verify_window_minutes: 5,
            request_timeout: Duration::from_secs(30),
            retry_jitter_min: Duration::from_millis(250),
            retry_jitter_max: Duration::from_millis(1000),
        }
    }
}

impl DeleteConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the verification window.
    #[must_use]
    pub const fn verify_window_minutes(mut self, minutes: u32) -> Self {
        self.verify_window_minutes = minutes;
        self
    }

    /// Sets the retry jitter range.
    #[must_use]
    pub const fn retry_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.retry_jitter_min = min;
        self.retry_jitter_max = max;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Bulk connect settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Timeout for a single connect request.
    pub request_timeout: Duration,
    /// How long to wait for a code or password before giving up.
    pub input_timeout: Option<Duration>,
    /// Prompts allowed per account before it counts as failed.
    pub max_input_prompts: u32,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            input_timeout: Some(Duration::from_secs(600)),
            max_input_prompts: 3,
        }
    }
}

impl ConnectConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the input timeout (`None` waits forever).
    #[must_use]
    pub const fn input_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.input_timeout = timeout;
        self
    }

    /// Sets the prompt limit.
    #[must_use]
    pub const fn max_input_prompts(mut self, prompts: u32) -> Self {
        self.max_input_prompts = prompts;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.session.poll_interval, Duration::from_secs(1));
        assert_eq!(config.session.max_reconnect_attempts, 5);
        assert!(!config.session.forward_pause);
        assert_eq!(config.delete.verify_window_minutes, 5);
        assert_eq!(config.connect.max_input_prompts, 3);
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"session": {"forward_pause": true}, "delete": {"verify_window_minutes": 10}}"#,
        )
        .unwrap();
        assert!(config.session.forward_pause);
        assert_eq!(config.session.poll_interval, Duration::from_secs(1));
        assert_eq!(config.delete.verify_window_minutes, 10);
    }

    #[test]
    fn test_builders() {
        let session = SessionConfig::new()
            .poll_interval(Duration::from_millis(500))
            .reconnect(Duration::from_secs(1), 2);
        assert_eq!(session.poll_interval, Duration::from_millis(500));
        assert_eq!(session.max_reconnect_attempts, 2);

        let connect = ConnectConfig::new().input_timeout(None).max_input_prompts(1);
        assert!(connect.input_timeout.is_none());
        assert_eq!(connect.max_input_prompts, 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("chatsweep-config-{}", std::process::id()));
        let path = dir.join("config.json");

        let mut config = EngineConfig::default();
        config.session.forward_pause = true;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("chatsweep-does-not-exist/config.json");
        let config = EngineConfig::load_or_default(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
