//! Bot configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use voicehold_types::{ChannelId, GuildId, UserId, VoiceChannel};

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Identity and access control.
    #[serde(default)]
    pub bot: BotConfig,

    /// Voice session settings.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Reconnection policy tunables.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Watchdog cadence.
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Guild and channel directory served by the loopback gateway.
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Clone, Deserialize)]
pub struct BotConfig {
    /// Gateway token. Usually supplied through `DISCORD_TOKEN`.
    #[serde(default)]
    pub token: String,

    /// The bot's own user id.
    #[serde(default = "default_bot_user_id")]
    pub user_id: UserId,

    /// Users allowed to run commands in addition to guild administrators.
    #[serde(default)]
    pub allowed_user_ids: Vec<UserId>,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("allowed_user_ids", &self.allowed_user_ids)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Join voice self-deafened.
    #[serde(default = "default_self_deaf")]
    pub self_deaf: bool,

    /// Seconds between keep-alive playback checks.
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Connect attempts per reconnection sequence.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit in seconds; attempt `n` waits `n` units.
    #[serde(default = "default_backoff_step_secs")]
    pub backoff_step_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    /// Seconds between watchdog ticks.
    #[serde(default = "default_watchdog_interval_secs")]
    pub interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voicehold_bot=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub guilds: Vec<GuildEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuildEntry {
    pub id: GuildId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelEntry {
    pub id: ChannelId,
    #[serde(default)]
    pub name: String,
}

impl GuildEntry {
    pub fn voice_channels(&self) -> impl Iterator<Item = VoiceChannel> + '_ {
        self.channels
            .iter()
            .map(|channel| VoiceChannel::new(channel.id, self.id, channel.name.clone()))
    }
}

fn default_bot_user_id() -> UserId {
    UserId(1)
}

fn default_self_deaf() -> bool {
    true
}

fn default_keepalive_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_step_secs() -> u64 {
    2
}

fn default_watchdog_interval_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            user_id: default_bot_user_id(),
            allowed_user_ids: Vec::new(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            self_deaf: default_self_deaf(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_secs: default_backoff_step_secs(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watchdog_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies environment variable overrides read through `lookup`.
///
/// - `DISCORD_TOKEN` overrides `bot.token`
/// - `VOICEHOLD_ALLOWED_USERS` (comma-separated ids) overrides `bot.allowed_user_ids`
/// - `VOICEHOLD_LOG_LEVEL` overrides `logging.level`
/// - `VOICEHOLD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// Unparseable user ids are skipped with a warning.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup("DISCORD_TOKEN") {
        config.bot.token = token;
    }
    if let Some(users) = lookup("VOICEHOLD_ALLOWED_USERS") {
        config.bot.allowed_user_ids = users
            .split(',')
            .filter(|raw| !raw.trim().is_empty())
            .filter_map(|raw| match raw.parse::<UserId>() {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(value = raw, error = %e, "ignoring invalid allowed user id");
                    None
                }
            })
            .collect();
    }
    if let Some(level) = lookup("VOICEHOLD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOICEHOLD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
