//! ZeroOps configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub notes: NotesConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Channels whose plain messages are forwarded. Empty = all channels.
    #[serde(default)]
    pub allowed_channels: Vec<String>,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_shutdown_timeout() -> u64 { 10 }

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            webhook: WebhookConfig::default(),
            discord: DiscordConfig::default(),
            notes: NotesConfig::default(),
            scheduler: SchedulerConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            allowed_channels: Vec::new(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl RelayConfig {
    /// Load config from the default path (~/.zeroops/config.toml).
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
            .map_err(|e| RelayError::io("read config", path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RelayError::io("create config dir", parent, e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content).map_err(|e| RelayError::io("write config", path, e))
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.webhook.url.trim().is_empty() {
            return Err(RelayError::Config("webhook.url is required".into()));
        }
        if !self.webhook.url.starts_with("http://") && !self.webhook.url.starts_with("https://") {
            return Err(RelayError::Config(format!(
                "webhook.url must be an http(s) URL, got '{}'",
                self.webhook.url
            )));
        }
        if self.discord.token.trim().is_empty() {
            return Err(RelayError::Config("discord.token is required".into()));
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(RelayError::Config("heartbeat.interval_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the ZeroOps home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zeroops")
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Automation webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    /// Shared secret sent in `secret_header`. Empty = no header.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
    /// Interactive commands and mentions.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Fire-and-forget forwards.
    #[serde(default = "default_async_timeout")]
    pub async_timeout_secs: u64,
    /// Scheduled and heartbeat jobs.
    #[serde(default = "default_schedule_timeout")]
    pub schedule_timeout_secs: u64,
}

fn default_secret_header() -> String { "x-api-key".into() }
fn default_command_timeout() -> u64 { 30 }
fn default_async_timeout() -> u64 { 30 }
fn default_schedule_timeout() -> u64 { 600 }

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            secret: String::new(),
            secret_header: default_secret_header(),
            command_timeout_secs: default_command_timeout(),
            async_timeout_secs: default_async_timeout(),
            schedule_timeout_secs: default_schedule_timeout(),
        }
    }
}

/// Discord bot credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: String,
    /// The bot's own user ID, used for mention detection.
    #[serde(default)]
    pub application_id: String,
    /// Bot username, for plain-text `@name` mentions.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_auto_archive")]
    pub thread_auto_archive_minutes: u32,
}

fn default_bot_name() -> String { "zeroops".into() }
fn default_api_base() -> String { "https://discord.com/api/v10".into() }
fn default_auto_archive() -> u32 { 60 }

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            application_id: String::new(),
            bot_name: default_bot_name(),
            api_base: default_api_base(),
            thread_auto_archive_minutes: default_auto_archive(),
        }
    }
}

/// Notes storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesConfig {
    #[serde(default = "default_notes_dir")]
    pub dir: String,
}

fn default_notes_dir() -> String { "~/.zeroops/notes".into() }

impl Default for NotesConfig {
    fn default() -> Self {
        Self { dir: default_notes_dir() }
    }
}

/// Cron scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone name; unknown names fall back to the local zone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,
}

fn default_timezone() -> String { "UTC".into() }
fn default_metadata_path() -> String { "~/.zeroops/metadata.json".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            metadata_path: default_metadata_path(),
        }
    }
}

/// Periodic heartbeat job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Empty = heartbeat disabled.
    #[serde(default)]
    pub channel_id: String,
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,
}

fn default_heartbeat_interval() -> u64 { 3600 }

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            interval_secs: default_heartbeat_interval(),
        }
    }
}

impl HeartbeatConfig {
    pub fn enabled(&self) -> bool {
        !self.channel_id.trim().is_empty()
    }
}
