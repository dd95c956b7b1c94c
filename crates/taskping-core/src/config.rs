//! TaskPing configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TaskPingError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPingConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl Default for TaskPingConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
            telegram: None,
        }
    }
}

impl TaskPingConfig {
    /// Load config from the default path (~/.taskping/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TaskPingError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TaskPingError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TaskPingError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the TaskPing home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskping")
    }
}

/// Reminder engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between engine runs.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Grace period after a stage's trigger time during which it still fires.
    /// Stages older than this are considered missed and are dropped.
    #[serde(default = "default_tolerance_window")]
    pub tolerance_window_secs: u64,
    /// Minimum minutes between two reminders for a task that does not set its own gap.
    #[serde(default = "default_min_gap")]
    pub default_min_gap_minutes: u32,
    /// Candidate batch size above which a capacity warning is logged.
    #[serde(default = "default_warn_threshold")]
    pub candidate_warn_threshold: usize,
}

fn default_tick_interval() -> u64 {
    60
}
fn default_tolerance_window() -> u64 {
    60
}
fn default_min_gap() -> u32 {
    58
}
fn default_warn_threshold() -> usize {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            tolerance_window_secs: default_tolerance_window(),
            default_min_gap_minutes: default_min_gap(),
            candidate_warn_threshold: default_warn_threshold(),
        }
    }
}

/// Task store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    TaskPingConfig::home_dir()
        .join("taskping.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Telegram delivery channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chat that receives reminders. TaskPing instances are single-user.
    pub chat_id: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn bool_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TaskPingConfig::default();
        assert_eq!(config.engine.tick_interval_secs, 60);
        assert_eq!(config.engine.tolerance_window_secs, 60);
        assert_eq!(config.engine.default_min_gap_minutes, 58);
        assert_eq!(config.engine.candidate_warn_threshold, 5000);
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: TaskPingConfig = toml::from_str(
            r#"
            [engine]
            tick_interval_secs = 30

            [telegram]
            bot_token = "123:abc"
            chat_id = "42"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.tick_interval_secs, 30);
        // Unspecified fields fall back to defaults
        assert_eq!(config.engine.default_min_gap_minutes, 58);
        let tg = config.telegram.unwrap();
        assert_eq!(tg.chat_id, "42");
        assert!(tg.enabled);
    }
}
