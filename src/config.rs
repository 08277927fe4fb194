//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard ceiling on concurrent downloads
pub const MAX_CONCURRENT_DOWNLOADS: usize = 5;

/// Main configuration for MediaDownloader
///
/// Every field has a default, so a partial JSON settings file is enough:
///
/// ```
/// use media_dl::Config;
///
/// let config: Config = serde_json::from_str(r#"{"max_concurrent_downloads": 4}"#).unwrap();
/// assert_eq!(config.max_concurrent_downloads, 4);
/// assert_eq!(config.history.max_entries, 100);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Download directory used by `start_with_config` (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent downloads (default: 2, at most 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Event broadcast buffer; slower subscribers lag past this (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How long shutdown waits for in-flight tasks to unwind (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Download history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// yt-dlp backend settings
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            event_buffer: default_event_buffer(),
            shutdown_timeout: default_shutdown_timeout(),
            history: HistoryConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults, matching a first launch.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        validate_concurrency(self.max_concurrent_downloads).map_err(|_| Error::Config {
            message: format!(
                "max_concurrent_downloads must be between 1 and {}, got {}",
                MAX_CONCURRENT_DOWNLOADS, self.max_concurrent_downloads
            ),
            key: Some("max_concurrent_downloads".to_string()),
        })?;

        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be greater than zero".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }

        if self.history.max_entries == 0 {
            return Err(Error::Config {
                message: "history.max_entries must be greater than zero".to_string(),
                key: Some("history.max_entries".to_string()),
            });
        }

        Ok(())
    }
}

/// Check a concurrency limit against `1..=MAX_CONCURRENT_DOWNLOADS`
pub fn validate_concurrency(limit: usize) -> Result<()> {
    if limit == 0 || limit > MAX_CONCURRENT_DOWNLOADS {
        return Err(Error::InvalidConcurrency {
            requested: limit,
            max: MAX_CONCURRENT_DOWNLOADS,
        });
    }
    Ok(())
}

/// Download history configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSON history file (None = no history is kept)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Most-recent entries retained (default: 100)
    #[serde(default = "default_history_max_entries")]
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_entries: default_history_max_entries(),
        }
    }
}

/// yt-dlp backend configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Format selector (default: "bestvideo+bestaudio/best")
    #[serde(default = "default_format")]
    pub format: String,

    /// Container for merged streams (default: "mp4")
    #[serde(default = "default_merge_output_format")]
    pub merge_output_format: String,

    /// Transport retries handed to yt-dlp (default: 10)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Fragment retries handed to yt-dlp (default: 10)
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,

    /// Socket timeout handed to yt-dlp (default: 30 seconds)
    #[serde(default = "default_socket_timeout", with = "duration_serde")]
    pub socket_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            format: default_format(),
            merge_output_format: default_merge_output_format(),
            retries: default_retries(),
            fragment_retries: default_retries(),
            socket_timeout: default_socket_timeout(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent() -> usize {
    2
}

fn default_event_buffer() -> usize {
    1000
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_history_max_entries() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    "bestvideo+bestaudio/best".to_string()
}

fn default_merge_output_format() -> String {
    "mp4".to_string()
}

fn default_retries() -> u32 {
    10
}

fn default_socket_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.max_concurrent_downloads, 2);
        assert_eq!(config.event_buffer, 1000);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.history.max_entries, 100);
        assert!(config.history.path.is_none());
        assert_eq!(config.backend.format, "bestvideo+bestaudio/best");
        assert_eq!(config.backend.merge_output_format, "mp4");
        assert_eq!(config.backend.retries, 10);
        assert_eq!(config.backend.fragment_retries, 10);
        assert!(config.backend.search_path);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("empty object must deserialize");
        assert_eq!(config.max_concurrent_downloads, 2);
        assert_eq!(config.backend.socket_timeout, Duration::from_secs(30));
    }

    #[test]
    fn validate_rejects_zero_and_above_ceiling() {
        for bad in [0, MAX_CONCURRENT_DOWNLOADS + 1] {
            let config = Config {
                max_concurrent_downloads: bad,
                ..Default::default()
            };
            match config.validate() {
                Err(Error::Config { key, .. }) => {
                    assert_eq!(key.as_deref(), Some("max_concurrent_downloads"))
                }
                other => panic!("expected Config error for {}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn validate_rejects_zero_event_buffer_and_history_size() {
        let config = Config {
            event_buffer: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let mut config = Config::default();
        config.history.max_entries = 0;
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn validate_concurrency_accepts_full_range() {
        for limit in 1..=MAX_CONCURRENT_DOWNLOADS {
            assert!(validate_concurrency(limit).is_ok(), "limit {} must be valid", limit);
        }
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(config.max_concurrent_downloads, 2);
    }

    #[test]
    fn save_then_load_keeps_user_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let config = Config {
            download_dir: PathBuf::from("/srv/media"),
            max_concurrent_downloads: 4,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.download_dir, PathBuf::from("/srv/media"));
        assert_eq!(loaded.max_concurrent_downloads, 4);
    }

    #[test]
    fn load_rejects_out_of_range_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"max_concurrent_downloads": 12}"#).unwrap();

        assert!(matches!(Config::load(&path), Err(Error::Config { .. })));
    }

    #[test]
    fn load_reports_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(Config::load(&path), Err(Error::Serialization(_))));
    }
}
