//! Discord client built on serenity's HTTP API.
//!
//! The bridge only posts and edits messages, so no gateway connection is
//! opened. Content arrives already split to Discord's length limit.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{CreateAllowedMentions, CreateAttachment, CreateMessage, EditMessage};
use serenity::http::Http;
use serenity::model::id::{ChannelId as DiscordChannelId, MessageId};
use tracing::debug;

use super::{DestinationPlatform, FileUpload};
use crate::common::error::PlatformResult;
use crate::common::types::{ChannelId, DestMessageId};

/// Discord side of the bridge.
pub struct DiscordDestination {
    http: Arc<Http>,
}

impl DiscordDestination {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }

    /// Check the token by fetching the bot's own user. Returns its name.
    pub async fn verify(&self) -> PlatformResult<String> {
        let user = self.http.get_current_user().await?;
        Ok(user.name.clone())
    }
}

/// Relayed text never pings anyone: no @everyone/@here, roles or users.
fn no_pings() -> CreateAllowedMentions {
    CreateAllowedMentions::new()
        .everyone(false)
        .all_roles(false)
        .all_users(false)
}

#[async_trait]
impl DestinationPlatform for DiscordDestination {
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        file: Option<&FileUpload>,
    ) -> PlatformResult<DestMessageId> {
        let mut builder = CreateMessage::new().allowed_mentions(no_pings());
        if !content.is_empty() {
            builder = builder.content(content);
        }
        if let Some(file) = file {
            builder = builder.add_file(CreateAttachment::bytes(file.data.clone(), file.name.clone()));
        }

        let message = DiscordChannelId::new(channel)
            .send_message(&*self.http, builder)
            .await?;
        debug!(channel, message = message.id.get(), "Sent Discord message");
        Ok(message.id.get())
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: DestMessageId,
        content: &str,
    ) -> PlatformResult<()> {
        let builder = EditMessage::new().content(content).allowed_mentions(no_pings());
        DiscordChannelId::new(channel)
            .edit_message(&*self.http, MessageId::new(message), builder)
            .await?;
        debug!(channel, message, "Edited Discord message");
        Ok(())
    }
}
