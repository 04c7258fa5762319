//! Canonical event types produced by the source platform.
//!
//! The Telegram adapter converts every update into these types so the
//! pipeline never touches client library structures directly.

use crate::common::types::{ChatId, SourceMessageId, ThreadId};

/// A raw event pulled from the source platform.
#[derive(Debug, Clone)]
pub struct SourceEvent {
    /// Monotonic update id used for backlog offsets.
    pub update_id: i64,
    pub kind: SourceEventKind,
}

/// What kind of update the event carries.
#[derive(Debug, Clone)]
pub enum SourceEventKind {
    Message(SourceMessage),
    EditedMessage(SourceMessage),
    ChannelPost(SourceMessage),
    EditedChannelPost(SourceMessage),
    /// Any update the bridge does not relay (callbacks, polls, ...).
    Unsupported,
}

impl SourceEvent {
    /// The message carried by this event, regardless of edit state.
    pub fn message(&self) -> Option<&SourceMessage> {
        match &self.kind {
            SourceEventKind::Message(m)
            | SourceEventKind::EditedMessage(m)
            | SourceEventKind::ChannelPost(m)
            | SourceEventKind::EditedChannelPost(m) => Some(m),
            SourceEventKind::Unsupported => None,
        }
    }

    /// Whether this event is an edit of an earlier message.
    pub fn is_edit(&self) -> bool {
        matches!(
            self.kind,
            SourceEventKind::EditedMessage(_) | SourceEventKind::EditedChannelPost(_)
        )
    }
}

/// Kind of chat a message was posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

/// A chat on the source platform.
#[derive(Debug, Clone)]
pub struct ChatRef {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
}

/// A user on the source platform.
#[derive(Debug, Clone)]
pub struct UserRef {
    pub id: u64,
    pub first_name: String,
    pub username: Option<String>,
}

impl UserRef {
    /// Name shown on the destination side.
    ///
    /// Prefers `@username` unless `prefer_first_name` is set or the user has none.
    pub fn display_name(&self, prefer_first_name: bool) -> String {
        match &self.username {
            Some(username) if !prefer_first_name => username.clone(),
            _ => self.first_name.clone(),
        }
    }
}

/// Where a forwarded message came from.
#[derive(Debug, Clone)]
pub enum ForwardOrigin {
    User(UserRef),
    /// A user who hides their account in forwards; only the name is known.
    HiddenUser(String),
    Chat(ChatRef),
}

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Document,
    Video,
    Audio,
    Voice,
    Animation,
    Sticker,
}

impl AttachmentKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Document => "file",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Voice => "voice message",
            Self::Animation => "GIF",
            Self::Sticker => "sticker",
        }
    }
}

/// Reference to a file hosted by the source platform.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub kind: AttachmentKind,
    pub file_id: String,
    pub file_name: Option<String>,
    /// Size in bytes as reported by the source platform.
    pub size: u32,
}

/// Join/leave service messages.
#[derive(Debug, Clone)]
pub enum MembershipChange {
    Joined(Vec<UserRef>),
    Left(UserRef),
}

/// A message on the source platform, normalized.
#[derive(Debug, Clone)]
pub struct SourceMessage {
    pub id: SourceMessageId,
    pub chat: ChatRef,
    pub thread_id: Option<ThreadId>,
    pub from: Option<UserRef>,
    /// Message text, or the media caption.
    pub text: Option<String>,
    pub reply_to: Option<Box<SourceMessage>>,
    pub forward: Option<ForwardOrigin>,
    pub attachment: Option<AttachmentRef>,
    pub membership: Option<MembershipChange>,
    /// Topic name when this is a forum-topic-created service message.
    pub forum_topic_created: Option<String>,
}

impl SourceMessage {
    /// Whether the text starts with a bot command (`/name`).
    pub fn is_command(&self) -> bool {
        self.text.as_deref().is_some_and(|t| t.starts_with('/'))
    }

    /// Parse a `/command` or `/command@bot` addressed to `bot_username`.
    ///
    /// Returns the lowercased command name without the slash. Commands
    /// explicitly addressed to another bot return `None`.
    pub fn command_for(&self, bot_username: &str) -> Option<String> {
        let text = self.text.as_deref()?;
        let word = text.strip_prefix('/')?.split_whitespace().next()?;
        let (name, target) = match word.split_once('@') {
            Some((name, target)) => (name, Some(target)),
            None => (word, None),
        };
        if let Some(target) = target {
            if !target.eq_ignore_ascii_case(bot_username) {
                return None;
            }
        }
        if name.is_empty() {
            return None;
        }
        Some(name.to_lowercase())
    }
}
