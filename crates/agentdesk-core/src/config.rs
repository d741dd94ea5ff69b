//! Agentdesk configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SchedulerError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentdeskConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl AgentdeskConfig {
    /// Load config from the default path (~/.agentdesk/config.toml).
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
            .map_err(|e| SchedulerError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SchedulerError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SchedulerError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Agentdesk home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agentdesk")
    }
}

/// Which backend persists task records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

/// Scheduler engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll interval for time-based triggers, clamped to 1..=5 seconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Probe interval for conditional triggers.
    #[serde(default = "default_condition_interval")]
    pub condition_interval_secs: u64,
    /// Upper bound on a single collaborator call.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    /// Artificial delay for the simulated collaborators.
    #[serde(default)]
    pub simulated_delay_ms: u64,
    /// POST custom actions that are `http(s)://` URLs instead of simulating them.
    #[serde(default)]
    pub webhook_custom_actions: bool,
    #[serde(default)]
    pub store: StoreBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_tick_interval() -> u64 { 1 }
fn default_condition_interval() -> u64 { 300 }
fn default_dispatch_timeout() -> u64 { 120 }
fn default_data_dir() -> String { "~/.agentdesk/scheduler".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            condition_interval_secs: default_condition_interval(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            simulated_delay_ms: 0,
            webhook_custom_actions: false,
            store: StoreBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.clamp(1, 5))
    }

    pub fn condition_interval(&self) -> Duration {
        Duration::from_secs(self.condition_interval_secs.max(1))
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs.max(1))
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    /// Data directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentdeskConfig::default();
        assert_eq!(config.scheduler.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.scheduler.condition_interval(), Duration::from_secs(300));
        assert_eq!(config.scheduler.store, StoreBackend::Json);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AgentdeskConfig = toml::from_str(
            r#"
            [scheduler]
            tick_interval_secs = 30
            store = "sqlite"
            "#,
        )
        .unwrap();
        // Clamped to the 5s ceiling.
        assert_eq!(config.scheduler.tick_interval(), Duration::from_secs(5));
        assert_eq!(config.scheduler.store, StoreBackend::Sqlite);
        assert_eq!(config.scheduler.dispatch_timeout_secs, 120);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AgentdeskConfig::default();
        config.scheduler.condition_interval_secs = 60;
        config.save_to(&path).unwrap();

        let loaded = AgentdeskConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.condition_interval_secs, 60);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AgentdeskConfig::load_from(Path::new("/nonexistent/agentdesk.toml")).unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }
}
