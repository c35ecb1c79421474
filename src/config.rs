use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_MAX_AUTO_DOWNLOAD_SIZE, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_VISIBLE_LIMIT,
    INITIAL_RETRY_DELAY_MS, MAX_RETRIES, MAX_RETRY_DELAY_SECS,
};
use crate::mail::MessageFlags;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// When deleted messages are expunged from the remote folder.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpungePolicy {
    /// Expunge right after a message is deleted (handled outside the engine).
    #[default]
    Immediately,
    /// Only when the user asks for it.
    Manually,
    /// Before every synchronization pass.
    OnPoll,
}

/// User-facing synchronization settings, as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_visible_limit")]
    pub default_visible_limit: i32,
    /// Ignore messages older than this many days (None = no cutoff)
    #[serde(default)]
    pub max_message_age_days: Option<u32>,
    /// Messages above this size in bytes are downloaded partially (0 = unlimited)
    #[serde(default = "default_max_auto_download_size")]
    pub max_auto_download_size: u64,
    #[serde(default = "default_true")]
    pub sync_remote_deletions: bool,
    #[serde(default = "default_sync_flags")]
    pub sync_flags: MessageFlags,
    #[serde(default)]
    pub expunge_policy: ExpungePolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_visible_limit: default_visible_limit(),
            max_message_age_days: None,
            max_auto_download_size: default_max_auto_download_size(),
            sync_remote_deletions: true,
            sync_flags: default_sync_flags(),
            expunge_policy: ExpungePolicy::default(),
        }
    }
}

impl SyncSettings {
    /// Resolve the settings into the read-only input of one pass.
    pub fn to_sync_config(&self, now: DateTime<Utc>) -> SyncConfig {
        SyncConfig {
            default_visible_limit: self.default_visible_limit,
            earliest_poll_date: self
                .max_message_age_days
                .map(|days| now - Duration::days(i64::from(days))),
            max_auto_download_size: match self.max_auto_download_size {
                0 => None,
                size => Some(size),
            },
            sync_remote_deletions: self.sync_remote_deletions,
            sync_flags: self.sync_flags,
            expunge_policy: self.expunge_policy,
        }
    }
}

/// Read-only configuration of a single synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Used when the local folder has no visible limit of its own.
    pub default_visible_limit: i32,
    /// Messages dated before this are neither considered nor imported.
    pub earliest_poll_date: Option<DateTime<Utc>>,
    /// None means every message is downloaded in full.
    pub max_auto_download_size: Option<u64>,
    pub sync_remote_deletions: bool,
    /// Remote-owned flags mirrored into the local store.
    pub sync_flags: MessageFlags,
    pub expunge_policy: ExpungePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncSettings::default().to_sync_config(Utc::now())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Folders synchronized on every poll
    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
    /// Seconds between polls (0 = only sync on request)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            folders: default_folders(),
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_secs: default_max_retry_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite database file (default: data dir/mailsync/cache.db)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_visible_limit() -> i32 {
    DEFAULT_VISIBLE_LIMIT
}

fn default_max_auto_download_size() -> u64 {
    DEFAULT_MAX_AUTO_DOWNLOAD_SIZE
}

fn default_true() -> bool {
    true
}

fn default_sync_flags() -> MessageFlags {
    MessageFlags::SEEN | MessageFlags::FLAGGED | MessageFlags::ANSWERED | MessageFlags::FORWARDED
}

fn default_folders() -> Vec<String> {
    vec!["INBOX".to_string()]
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_retries() -> u32 {
    MAX_RETRIES
}

fn default_initial_retry_delay_ms() -> u64 {
    INITIAL_RETRY_DELAY_MS
}

fn default_max_retry_delay_secs() -> u64 {
    MAX_RETRY_DELAY_SECS
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("mailsync");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_local_dir()
            .context("Could not find data directory")?
            .join("mailsync");
        Ok(dir)
    }

    /// Location of the SQLite cache, honoring the `[cache]` override.
    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("cache.db")),
        }
    }

    /// Load the config file from the default location. A missing file
    /// yields the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [sync]
            default_visible_limit = 50
            max_message_age_days = 7
            max_auto_download_size = 0
            sync_remote_deletions = false
            sync_flags = "SEEN | FLAGGED"
            expunge_policy = "on_poll"

            [scheduler]
            folders = ["INBOX", "Archive"]
            poll_interval_secs = 60

            [cache]
            path = "/tmp/mailsync-test.db"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sync.default_visible_limit, 50);
        assert_eq!(config.sync.max_message_age_days, Some(7));
        assert!(!config.sync.sync_remote_deletions);
        assert_eq!(config.sync.sync_flags, MessageFlags::SEEN | MessageFlags::FLAGGED);
        assert_eq!(config.sync.expunge_policy, ExpungePolicy::OnPoll);
        assert_eq!(config.scheduler.folders, vec!["INBOX", "Archive"]);
        assert_eq!(config.scheduler.max_retries, MAX_RETRIES);
        assert_eq!(
            config.cache_path().unwrap(),
            PathBuf::from("/tmp/mailsync-test.db")
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sync.default_visible_limit, DEFAULT_VISIBLE_LIMIT);
        assert!(config.sync.sync_remote_deletions);
        assert!(config.sync.sync_flags.contains(MessageFlags::SEEN));
        assert!(!config.sync.sync_flags.contains(MessageFlags::DELETED));
        assert_eq!(config.sync.expunge_policy, ExpungePolicy::Immediately);
        assert_eq!(config.scheduler.folders, vec!["INBOX"]);
    }

    #[test]
    fn test_to_sync_config() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let settings = SyncSettings {
            max_message_age_days: Some(10),
            max_auto_download_size: 0,
            ..SyncSettings::default()
        };

        let config = settings.to_sync_config(now);
        assert_eq!(
            config.earliest_poll_date,
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap())
        );
        assert_eq!(config.max_auto_download_size, None);

        let config = SyncSettings::default().to_sync_config(now);
        assert_eq!(config.earliest_poll_date, None);
        assert_eq!(
            config.max_auto_download_size,
            Some(DEFAULT_MAX_AUTO_DOWNLOAD_SIZE)
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("mailsync-does-not-exist/config.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.sync.default_visible_limit, DEFAULT_VISIBLE_LIMIT);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("mailsync-config-{}", std::process::id()))
            .join("config.toml");
        let mut config = Config::default();
        config.sync.default_visible_limit = 100;
        config.scheduler.folders = vec!["Work".to_string()];

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.sync.default_visible_limit, 100);
        assert_eq!(loaded.scheduler.folders, vec!["Work"]);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
