//! Todoke configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TodokeError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TodokeConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub line: LineConfig,
}

impl TodokeConfig {
    /// Load config from the default path (~/.todoke/config.toml).
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
            .map_err(|e| TodokeError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TodokeError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TodokeError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Todoke home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".todoke")
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8720
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Reconciliation loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between reconciliation runs.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Upper bound on concurrent per-submission send pipelines.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_sends: usize,
    /// Timeout applied to a single outbound send attempt.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_check_interval() -> u64 {
    300
}
fn default_max_concurrent() -> usize {
    8
}
fn default_send_timeout() -> u64 {
    45
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            max_concurrent_sends: default_max_concurrent(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.todoke/todoke.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StoreConfig {
    /// Resolve `~` in the configured path.
    pub fn resolved_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest)
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

/// SMTP transport configuration for the email sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Display name used when a campaign has no from address of its own.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Fallback from address when the campaign form settings carry none.
    #[serde(default)]
    pub from_email: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_name() -> String {
    "Todoke".into()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_name: default_from_name(),
            from_email: String::new(),
        }
    }
}

/// LINE Messaging API configuration.
///
/// Channel credentials live on each campaign; only the API endpoint is
/// global, overridable for staging and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    #[serde(default = "default_line_api_base")]
    pub api_base: String,
}

fn default_line_api_base() -> String {
    "https://api.line.me".into()
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            api_base: default_line_api_base(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = TodokeConfig::default();
        assert_eq!(cfg.scheduler.check_interval_secs, 300);
        assert_eq!(cfg.gateway.port, 8720);
        assert_eq!(cfg.line.api_base, "https://api.line.me");
    }

    #[test]
    fn test_partial_toml() {
        let cfg: TodokeConfig = toml::from_str(
            r#"
            [scheduler]
            check_interval_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.check_interval_secs, 60);
        // Untouched sections keep their defaults
        assert_eq!(cfg.scheduler.max_concurrent_sends, 8);
        assert_eq!(cfg.smtp.port, 587);
    }
}
