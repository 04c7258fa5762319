//! Telegram client built on teloxide.
//!
//! Converts Bot API updates into the bridge's own event types and exposes
//! the source-side capabilities the relay needs.

use std::time::Duration;

use async_trait::async_trait;
use backon::BackoffBuilder;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, BotCommand, Chat, ChatAdministratorRights, FileMeta, MessageId, MessageOrigin,
    ReplyParameters, ThreadId as TopicId, UpdateKind, User,
};
use teloxide::{ApiError, RequestError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{AdminRights, BotCommandEntry, FileUpload, PermissionScope, SourcePlatform};
use crate::common::error::{PlatformError, PlatformResult};
use crate::common::messages::{
    AttachmentKind, AttachmentRef, ChatKind, ChatRef, ForwardOrigin, MembershipChange,
    SourceEvent, SourceEventKind, SourceMessage, UserRef,
};
use crate::common::types as ids;
use crate::common::types::BotIdentity;

/// Long-polling timeout for live retrieval.
const POLL_TIMEOUT_SECS: u32 = 30;

/// Upper bound on the wait between failed polls.
const MAX_POLL_BACKOFF: Duration = Duration::from_secs(60);

/// Telegram side of the bridge.
pub struct TelegramSource {
    bot: Bot,
}

impl TelegramSource {
    /// Build the client and clear any webhook so long polling works.
    pub async fn connect(token: &str) -> PlatformResult<Self> {
        // The HTTP timeout must outlast the long-poll timeout
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(POLL_TIMEOUT_SECS) + 15))
            .build()
            .map_err(|e| PlatformError::Unexpected {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        let bot = Bot::with_client(token, client);

        bot.delete_webhook().await?;
        debug!("Telegram webhook cleared");

        Ok(Self { bot })
    }
}

/// Exponential backoff for failed polls: 1s initial, 60s max, with jitter.
fn poll_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(MAX_POLL_BACKOFF)
        .with_factor(2.0)
        .with_jitter()
        .without_max_times()
        .build()
}

fn to_offset(offset: i64) -> PlatformResult<i32> {
    i32::try_from(offset).map_err(|_| PlatformError::Unexpected {
        message: format!("update offset {} out of range", offset),
    })
}

#[async_trait]
impl SourcePlatform for TelegramSource {
    async fn get_self_identity(&self) -> PlatformResult<BotIdentity> {
        let me = self.bot.get_me().await?;
        Ok(BotIdentity {
            id: me.user.id.0,
            username: me.user.username.clone().unwrap_or_default(),
            first_name: me.user.first_name.clone(),
        })
    }

    async fn fetch_backlog_batch(&self, offset: i64, limit: u8) -> PlatformResult<Vec<SourceEvent>> {
        let updates = self
            .bot
            .get_updates()
            .offset(to_offset(offset)?)
            .limit(limit)
            .timeout(0)
            .await?;
        Ok(updates.into_iter().map(convert_update).collect())
    }

    async fn register_commands(&self, commands: &[BotCommandEntry]) -> PlatformResult<()> {
        let commands = commands
            .iter()
            .map(|c| BotCommand::new(c.command.clone(), c.description.clone()));
        self.bot.set_my_commands(commands).await?;
        Ok(())
    }

    async fn get_registered_commands(&self) -> PlatformResult<Vec<BotCommandEntry>> {
        let commands = self.bot.get_my_commands().await?;
        Ok(commands
            .into_iter()
            .map(|c| BotCommandEntry::new(c.command, c.description))
            .collect())
    }

    async fn set_default_permissions(
        &self,
        rights: &AdminRights,
        scope: PermissionScope,
    ) -> PlatformResult<()> {
        let rights: ChatAdministratorRights = serde_json::to_value(rights)
            .and_then(serde_json::from_value)
            .map_err(|e| PlatformError::Unexpected {
                message: format!("invalid administrator rights template: {}", e),
            })?;

        self.bot
            .set_my_default_administrator_rights()
            .rights(rights)
            .for_channels(scope == PermissionScope::Channels)
            .await?;
        Ok(())
    }

    async fn start_continuous_retrieval(
        &self,
        offset: i64,
        sink: mpsc::UnboundedSender<SourceEvent>,
    ) -> PlatformResult<()> {
        info!(offset, "Starting Telegram long polling");

        let mut offset = offset;
        let mut backoff = poll_backoff();

        loop {
            let result = self
                .bot
                .get_updates()
                .offset(to_offset(offset)?)
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![
                    AllowedUpdate::Message,
                    AllowedUpdate::EditedMessage,
                    AllowedUpdate::ChannelPost,
                    AllowedUpdate::EditedChannelPost,
                ])
                .await;

            match result {
                Ok(updates) => {
                    backoff = poll_backoff();
                    debug!(count = updates.len(), "Got Telegram updates");
                    for update in updates {
                        let event = convert_update(update);
                        offset = event.update_id + 1;
                        sink.send(event).map_err(|_| PlatformError::SinkClosed)?;
                    }
                }
                // Another instance is polling with the same token
                Err(e @ RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    return Err(e.into());
                }
                Err(e) => {
                    let delay = backoff.next().unwrap_or(MAX_POLL_BACKOFF);
                    warn!(
                        error = %e,
                        "Telegram getUpdates failed. Retrying in {:.1}s...",
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn send_message(
        &self,
        chat: ids::ChatId,
        thread: Option<ids::ThreadId>,
        reply_to: Option<ids::SourceMessageId>,
        text: &str,
    ) -> PlatformResult<ids::SourceMessageId> {
        let mut request = self.bot.send_message(ChatId(chat), text);
        if let Some(thread) = thread {
            request = request.message_thread_id(TopicId(MessageId(thread)));
        }
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        let message = request.await?;
        Ok(message.id.0)
    }

    async fn edit_message(
        &self,
        chat: ids::ChatId,
        message: ids::SourceMessageId,
        text: &str,
    ) -> PlatformResult<()> {
        self.bot
            .edit_message_text(ChatId(chat), MessageId(message), text)
            .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> PlatformResult<FileUpload> {
        let file = self.bot.get_file(file_id).await?;

        let mut data = Vec::with_capacity(file.meta.size as usize);
        self.bot.download_file(&file.path, &mut data).await?;
        debug!(path = %file.path, bytes = data.len(), "Downloaded Telegram file");

        Ok(FileUpload {
            name: storage_name(&file.path).to_string(),
            data,
        })
    }
}

/// Last segment of a Bot API file path, e.g. `file_3.jpg` for `photos/file_3.jpg`.
fn storage_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn convert_update(update: Update) -> SourceEvent {
    let update_id = i64::from(update.id.0);
    let kind = match update.kind {
        UpdateKind::Message(m) => SourceEventKind::Message(convert_message(&m)),
        UpdateKind::EditedMessage(m) => SourceEventKind::EditedMessage(convert_message(&m)),
        UpdateKind::ChannelPost(m) => SourceEventKind::ChannelPost(convert_message(&m)),
        UpdateKind::EditedChannelPost(m) => SourceEventKind::EditedChannelPost(convert_message(&m)),
        other => {
            debug!("Ignoring unsupported update: {:?}", other);
            SourceEventKind::Unsupported
        }
    };
    SourceEvent { update_id, kind }
}

fn convert_message(msg: &Message) -> SourceMessage {
    SourceMessage {
        id: msg.id.0,
        chat: convert_chat(&msg.chat),
        thread_id: msg.thread_id.map(|t| t.0 .0),
        from: msg.from.as_ref().map(convert_user),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        reply_to: msg.reply_to_message().map(|r| Box::new(convert_message(r))),
        forward: msg.forward_origin().map(convert_origin),
        attachment: convert_attachment(msg),
        membership: convert_membership(msg),
        forum_topic_created: msg.forum_topic_created().map(|t| t.name.clone()),
    }
}

fn convert_chat(chat: &Chat) -> ChatRef {
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_channel() {
        ChatKind::Channel
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Group
    };

    ChatRef {
        id: chat.id.0,
        kind,
        title: chat.title().map(str::to_string),
    }
}

fn convert_user(user: &User) -> UserRef {
    UserRef {
        id: user.id.0,
        first_name: user.first_name.clone(),
        username: user.username.clone(),
    }
}

fn convert_origin(origin: &MessageOrigin) -> ForwardOrigin {
    match origin {
        MessageOrigin::User { sender_user, .. } => ForwardOrigin::User(convert_user(sender_user)),
        MessageOrigin::HiddenUser {
            sender_user_name, ..
        } => ForwardOrigin::HiddenUser(sender_user_name.clone()),
        MessageOrigin::Chat { sender_chat, .. } => ForwardOrigin::Chat(convert_chat(sender_chat)),
        MessageOrigin::Channel { chat, .. } => ForwardOrigin::Chat(convert_chat(chat)),
    }
}

fn convert_attachment(msg: &Message) -> Option<AttachmentRef> {
    let attachment = |kind, file: &FileMeta, file_name: Option<&String>| AttachmentRef {
        kind,
        file_id: file.id.clone(),
        file_name: file_name.cloned(),
        size: file.size,
    };

    // Telegram lists photo sizes smallest first
    if let Some(sizes) = msg.photo() {
        return sizes
            .last()
            .map(|p| attachment(AttachmentKind::Photo, &p.file, None));
    }
    if let Some(d) = msg.document() {
        return Some(attachment(AttachmentKind::Document, &d.file, d.file_name.as_ref()));
    }
    if let Some(v) = msg.video() {
        return Some(attachment(AttachmentKind::Video, &v.file, v.file_name.as_ref()));
    }
    if let Some(a) = msg.animation() {
        return Some(attachment(AttachmentKind::Animation, &a.file, a.file_name.as_ref()));
    }
    if let Some(a) = msg.audio() {
        return Some(attachment(AttachmentKind::Audio, &a.file, a.file_name.as_ref()));
    }
    if let Some(v) = msg.voice() {
        return Some(attachment(AttachmentKind::Voice, &v.file, None));
    }
    msg.sticker()
        .map(|s| attachment(AttachmentKind::Sticker, &s.file, None))
}

fn convert_membership(msg: &Message) -> Option<MembershipChange> {
    if let Some(users) = msg.new_chat_members() {
        return Some(MembershipChange::Joined(users.iter().map(convert_user).collect()));
    }
    msg.left_chat_member()
        .map(|user| MembershipChange::Left(convert_user(user)))
}
