//! Capability interfaces for the two chat platforms.
//!
//! The relay core only talks to these traits. `telegram` and `discord`
//! implement them on top of teloxide and serenity.

pub mod discord;
pub mod telegram;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::common::error::PlatformResult;
use crate::common::messages::SourceEvent;
use crate::common::types::{BotIdentity, ChannelId, ChatId, DestMessageId, SourceMessageId, ThreadId};

pub use discord::DiscordDestination;
pub use telegram::TelegramSource;

/// A bot command as registered with the source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCommandEntry {
    pub command: String,
    pub description: String,
}

impl BotCommandEntry {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// A file fetched from the source platform, ready to upload elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub data: Vec<u8>,
}

/// Where a default administrator rights template applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    Groups,
    Channels,
}

impl PermissionScope {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Groups => "groups",
            Self::Channels => "channels",
        }
    }
}

/// Administrator rights suggested to users who promote the bot.
///
/// Field names follow the Telegram Bot API so the template serializes
/// directly into the request payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminRights {
    pub is_anonymous: bool,
    pub can_manage_chat: bool,
    pub can_delete_messages: bool,
    pub can_manage_video_chats: bool,
    pub can_restrict_members: bool,
    pub can_promote_members: bool,
    pub can_change_info: bool,
    pub can_invite_users: bool,
    pub can_post_stories: bool,
    pub can_edit_stories: bool,
    pub can_delete_stories: bool,
    pub can_post_messages: bool,
    pub can_edit_messages: bool,
    pub can_pin_messages: bool,
    pub can_manage_topics: bool,
}

impl AdminRights {
    /// Template for groups and supergroups.
    pub fn for_groups() -> Self {
        Self {
            can_manage_chat: true,
            can_delete_messages: true,
            ..Self::default()
        }
    }

    /// Template for broadcast channels; the bot must see and post messages.
    pub fn for_channels() -> Self {
        Self {
            can_manage_chat: true,
            can_post_messages: true,
            can_edit_messages: true,
            ..Self::default()
        }
    }
}

/// Capabilities required from the source (Telegram) client.
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    async fn get_self_identity(&self) -> PlatformResult<BotIdentity>;

    /// Fetch up to `limit` queued events starting at `offset`.
    ///
    /// Fetching with an offset acknowledges every event below it.
    async fn fetch_backlog_batch(&self, offset: i64, limit: u8) -> PlatformResult<Vec<SourceEvent>>;

    async fn register_commands(&self, commands: &[BotCommandEntry]) -> PlatformResult<()>;

    async fn get_registered_commands(&self) -> PlatformResult<Vec<BotCommandEntry>>;

    async fn set_default_permissions(
        &self,
        rights: &AdminRights,
        scope: PermissionScope,
    ) -> PlatformResult<()>;

    /// Pull events from `offset` onwards into `sink` until the process stops.
    ///
    /// Returns only on a fatal error or when `sink` is closed.
    async fn start_continuous_retrieval(
        &self,
        offset: i64,
        sink: mpsc::UnboundedSender<SourceEvent>,
    ) -> PlatformResult<()>;

    async fn send_message(
        &self,
        chat: ChatId,
        thread: Option<ThreadId>,
        reply_to: Option<SourceMessageId>,
        text: &str,
    ) -> PlatformResult<SourceMessageId>;

    async fn edit_message(&self, chat: ChatId, message: SourceMessageId, text: &str) -> PlatformResult<()>;

    /// Download a hosted file.
    ///
    /// The returned name is the last segment of the platform's storage path.
    async fn download_file(&self, file_id: &str) -> PlatformResult<FileUpload>;
}

/// Capabilities required from the destination (Discord) client.
#[async_trait]
pub trait DestinationPlatform: Send + Sync {
    /// Post a message, optionally with one uploaded file. `content` may be
    /// empty when a file is attached.
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        file: Option<&FileUpload>,
    ) -> PlatformResult<DestMessageId>;

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: DestMessageId,
        content: &str,
    ) -> PlatformResult<()>;
}
