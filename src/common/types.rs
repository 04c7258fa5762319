//! Shared identifier types used across the application.

/// Telegram chat identifier.
pub type ChatId = i64;

/// Forum topic (message thread) identifier inside a Telegram chat.
pub type ThreadId = i32;

/// Message identifier on the source (Telegram) side.
pub type SourceMessageId = i32;

/// Discord channel identifier.
pub type ChannelId = u64;

/// Message identifier on the destination (Discord) side.
pub type DestMessageId = u64;

/// The platform side an event originated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Telegram.
    Source,
    /// Discord.
    Destination,
}

/// Identity of the bot account on the source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
    pub first_name: String,
}
