//! Configuration type definitions.

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub startup: StartupConfig,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    /// Discard updates that queued up while the bridge was offline.
    #[serde(default = "default_true")]
    pub skip_old_messages: bool,
    /// Show senders by first name rather than @username.
    #[serde(default)]
    pub use_first_name_instead_of_username: bool,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
}

/// A single Telegram chat <-> Discord channel link.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Unique bridge name, also used to scope message identity records.
    pub name: String,
    /// Direction: "both", "telegram_to_discord", "discord_to_telegram"
    #[serde(default = "default_direction")]
    pub direction: String,
    pub telegram: TelegramEndpointConfig,
    pub discord: DiscordEndpointConfig,
}

/// Telegram side of a bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramEndpointConfig {
    pub chat_id: i64,
    /// Restrict the bridge to one forum topic.
    pub thread_id: Option<i32>,
    #[serde(default = "default_true")]
    pub relay_join_messages: bool,
    #[serde(default = "default_true")]
    pub relay_leave_messages: bool,
    /// Relay messages starting with a bot command.
    #[serde(default)]
    pub relay_commands: bool,
}

/// Discord side of a bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordEndpointConfig {
    pub channel_id: u64,
    /// Prefix relayed messages with the sender's name.
    #[serde(default = "default_true")]
    pub send_usernames: bool,
    /// Format string for relayed messages (%user, %message).
    pub format: Option<String>,
}

/// Relay tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Minimum seconds between "this is a bridge bot" replies per chat.
    #[serde(default = "default_anti_spam_window_secs")]
    pub anti_spam_window_secs: u64,
    /// Maximum remembered source -> destination message pairs.
    #[serde(default = "default_identity_capacity")]
    pub identity_capacity: usize,
    /// Maximum cached forum topics.
    #[serde(default = "default_thread_index_capacity")]
    pub thread_index_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            anti_spam_window_secs: default_anti_spam_window_secs(),
            identity_capacity: default_identity_capacity(),
            thread_index_capacity: default_thread_index_capacity(),
        }
    }
}

/// Startup timing.
#[derive(Debug, Clone, Deserialize)]
pub struct StartupConfig {
    /// Delay before live retrieval when the backlog is kept.
    #[serde(default = "default_keep_backlog_delay_ms")]
    pub keep_backlog_delay_ms: u64,
    /// Delay before re-checking the registered command set.
    #[serde(default = "default_verify_commands_delay_secs")]
    pub verify_commands_delay_secs: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            keep_backlog_delay_ms: default_keep_backlog_delay_ms(),
            verify_commands_delay_secs: default_verify_commands_delay_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_direction() -> String {
    "both".to_string()
}

fn default_anti_spam_window_secs() -> u64 {
    60
}

fn default_identity_capacity() -> usize {
    10_000
}

fn default_thread_index_capacity() -> usize {
    1_000
}

fn default_keep_backlog_delay_ms() -> u64 {
    1_000
}

fn default_verify_commands_delay_secs() -> u64 {
    10
}
