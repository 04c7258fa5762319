//! Pipeline stages, in execution order.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::context::*;
use super::formatter::{escape_markdown, truncate, DISCORD_MAX_UPLOAD_BYTES};
use crate::common::error::PipelineError;
use crate::common::messages::{
    AttachmentRef, ChatKind, ForwardOrigin, MembershipChange, SourceEvent, SourceEventKind, SourceMessage,
};
use crate::common::types::Origin;

/// Reply sent to people who message the bot directly.
pub const PRIVATE_CHAT_NOTICE: &str = "This bot relays messages between Telegram groups and \
    Discord channels. It does not answer private messages. \
    Add it to a group and use /chatinfo there to get the chat id for a bridge.";

/// Longest reply excerpt quoted above a relayed message, in characters.
const REPLY_EXCERPT_LENGTH: usize = 100;

impl Attached {
    /// Stage 1.
    pub fn new(env: Arc<Collaborators>, event: SourceEvent) -> Self {
        Self { env, event }
    }

    /// Stage 2: unwrap the message, folding channel posts into messages.
    ///
    /// Forum topic names are observed here so lookups see every topic the
    /// bot has witnessed, bridged or not.
    pub fn normalize(self) -> Option<Normalized> {
        let (kind, message) = match self.event.kind {
            SourceEventKind::Message(m) | SourceEventKind::ChannelPost(m) => (MessageKind::New, m),
            SourceEventKind::EditedMessage(m) | SourceEventKind::EditedChannelPost(m) => {
                (MessageKind::Edit, m)
            }
            SourceEventKind::Unsupported => {
                debug!(update_id = self.event.update_id, "Dropping unsupported update");
                return None;
            }
        };

        self.env.threads.observe(&message);

        Some(Normalized {
            env: self.env,
            kind,
            message,
        })
    }
}

impl Normalized {
    /// Stage 3.
    pub fn identify(self) -> Identified {
        Identified {
            source_id: self.message.id,
            env: self.env,
            kind: self.kind,
            message: self.message,
        }
    }
}

impl Identified {
    /// Stage 4: resolve candidate bridges against one table snapshot.
    pub fn resolve(self) -> Routing {
        if self.message.chat.kind == ChatKind::Private {
            return Routing::Private(self);
        }

        let table = self.env.bridges.snapshot();
        let bridges = table.resolve(self.message.chat.id, self.message.thread_id, Origin::Source);
        if bridges.is_empty() {
            debug!(
                chat = self.message.chat.id,
                thread = ?self.message.thread_id,
                "No bridge for chat, dropping event"
            );
            return Routing::Unbridged;
        }

        Routing::Bridged(Routed { base: self, bridges })
    }

    /// Stage 5: explain the bot to a private chat, at most once per window.
    pub async fn inform(self) -> Result<Outcome, PipelineError> {
        let chat_id = self.message.chat.id;
        if self.kind == MessageKind::Edit || !self.env.anti_spam.should_notify(chat_id) {
            debug!(chat = chat_id, "Private message suppressed");
            return Ok(Outcome::Dropped(DropReason::PrivateSuppressed));
        }

        self.env
            .source
            .send_message(chat_id, None, Some(self.source_id), PRIVATE_CHAT_NOTICE)
            .await
            .map_err(|source| PipelineError::Reply { chat_id, source })?;

        info!(chat = chat_id, "Answered private message");
        Ok(Outcome::Informed)
    }
}

impl Routed {
    /// Stage 6: strip bridges that must not relay this event.
    pub fn filter(self) -> Option<Routed> {
        let is_command = self.base.message.is_command();
        let bridges: Vec<_> = self
            .bridges
            .into_iter()
            .filter(|b| b.direction.permits(Origin::Source))
            .filter(|b| !is_command || b.options.relay_commands)
            .collect();

        if bridges.is_empty() {
            debug!(message = self.base.source_id, "Every bridge filtered the event");
            return None;
        }
        Some(Routed {
            base: self.base,
            bridges,
        })
    }

    /// Stage 7: send membership changes down the notice path.
    pub fn classify(mut self) -> Classified {
        match self.base.message.membership.take() {
            Some(change) => Classified::Membership(MembershipNotice {
                routed: self,
                change,
            }),
            None => Classified::Content(self),
        }
    }

    /// Begin stage 8.
    pub fn enrich(self) -> Enriching<NeedsSender> {
        Enriching {
            routed: self,
            fields: EnrichedFields::default(),
            _stage: PhantomData,
        }
    }
}

impl MembershipNotice {
    /// Build the join/leave notice for bridges that relay it.
    pub fn prepare(self) -> Option<Prepared> {
        let MembershipNotice { mut routed, change } = self;
        let env = Arc::clone(&routed.base.env);

        let body = match change {
            MembershipChange::Joined(users) => {
                routed.bridges.retain(|b| b.options.relay_join_messages);
                // The bot being added to the chat is not news
                let names: Vec<_> = users
                    .iter()
                    .filter(|u| u.id != env.me.id)
                    .map(|u| escape_markdown(&u.display_name(env.use_first_name)))
                    .collect();
                if names.is_empty() {
                    return None;
                }
                format!("**{}** joined the Telegram side of the chat", names.join(", "))
            }
            MembershipChange::Left(user) => {
                routed.bridges.retain(|b| b.options.relay_leave_messages);
                format!(
                    "**{}** left the Telegram side of the chat",
                    escape_markdown(&user.display_name(env.use_first_name))
                )
            }
        };

        if routed.bridges.is_empty() {
            return None;
        }
        Some(Prepared {
            routed,
            payload: RelayPayload {
                author: None,
                body,
                file: None,
            },
        })
    }
}

impl Enriching<NeedsSender> {
    /// Channel posts have no sender; the channel itself is the author.
    pub fn with_sender(self) -> Enriching<NeedsReply> {
        let message = self.message();
        let sender = message
            .from
            .as_ref()
            .map(|user| user.display_name(self.env().use_first_name))
            .or_else(|| message.chat.title.clone())
            .map(|name| SenderDescriptor { name });

        self.advance(|fields| EnrichedFields { sender, ..fields })
    }
}

impl Enriching<NeedsReply> {
    pub fn with_reply(self) -> Enriching<NeedsForward> {
        let env = self.env();
        // Inside a forum topic every message replies to the topic's service message
        let reply = self
            .message()
            .reply_to
            .as_deref()
            .filter(|target| target.forum_topic_created.is_none())
            .map(|target| describe_reply(target, env.use_first_name));

        self.advance(|fields| EnrichedFields { reply, ..fields })
    }
}

impl Enriching<NeedsForward> {
    pub fn with_forward(self) -> Enriching<NeedsText> {
        let use_first_name = self.env().use_first_name;
        let forward = self.message().forward.as_ref().map(|origin| ForwardDescriptor {
            from: match origin {
                ForwardOrigin::User(user) => user.display_name(use_first_name),
                ForwardOrigin::HiddenUser(name) => name.clone(),
                ForwardOrigin::Chat(chat) => chat.title.clone().unwrap_or_else(|| chat.id.to_string()),
            },
        });

        self.advance(|fields| EnrichedFields { forward, ..fields })
    }
}

impl Enriching<NeedsText> {
    pub fn with_text(self) -> Enriching<NeedsAttachment> {
        let text = self
            .message()
            .text
            .clone()
            .filter(|t| !t.trim().is_empty());

        self.advance(|fields| EnrichedFields { text, ..fields })
    }
}

impl Enriching<NeedsAttachment> {
    /// Download the attached file, if any, so it can be uploaded to Discord.
    ///
    /// Files too large to upload or that fail to download are replaced by a
    /// short note; the rest of the message is still relayed.
    pub async fn with_attachment(self) -> Enriched {
        let attachment = match &self.message().attachment {
            Some(file) => Some(self.fetch(file).await),
            None => None,
        };

        Enriched {
            routed: self.routed,
            fields: EnrichedFields {
                attachment,
                ..self.fields
            },
        }
    }

    async fn fetch(&self, file: &AttachmentRef) -> AttachmentDescriptor {
        let label = file.kind.label();
        if file.size > DISCORD_MAX_UPLOAD_BYTES {
            debug!(
                message = self.routed.base.source_id,
                size = file.size,
                "Attachment too large to upload"
            );
            return AttachmentDescriptor::Note(format!("[{} too large to relay]", label));
        }

        match self.env().source.download_file(&file.file_id).await {
            Ok(mut upload) => {
                if let Some(name) = &file.file_name {
                    upload.name = name.clone();
                }
                AttachmentDescriptor::Upload(Arc::new(upload))
            }
            Err(e) => {
                warn!(
                    message = self.routed.base.source_id,
                    error = %e,
                    "Failed to download attachment"
                );
                AttachmentDescriptor::Note(format!("[{} could not be relayed]", label))
            }
        }
    }
}

impl Enriched {
    /// Stage 9: assemble the payload. `None` when there is nothing to relay.
    ///
    /// Everything taken from Telegram is escaped here, before the bridge's
    /// own markup is added around it.
    pub fn assemble(self) -> Option<Prepared> {
        let Enriched { routed, fields } = self;

        let mut content = Vec::new();
        if let Some(text) = fields.text {
            content.push(escape_markdown(&text));
        }
        let file = match fields.attachment {
            Some(AttachmentDescriptor::Upload(upload)) => Some(upload),
            Some(AttachmentDescriptor::Note(note)) => {
                content.push(note);
                None
            }
            None => None,
        };
        if content.is_empty() && file.is_none() {
            debug!(message = routed.base.source_id, "Nothing to relay");
            return None;
        }

        let mut lines = Vec::with_capacity(content.len() + 2);
        if let Some(forward) = fields.forward {
            lines.push(format!("*forwarded from {}*", escape_markdown(&forward.from)));
        }
        if let Some(reply) = fields.reply {
            lines.push(format!(
                "> **{}**: {}",
                escape_markdown(&reply.author),
                escape_markdown(&reply.excerpt)
            ));
        }
        lines.extend(content);

        Some(Prepared {
            routed,
            payload: RelayPayload {
                author: fields.sender.map(|s| escape_markdown(&s.name)),
                body: lines.join("\n"),
                file,
            },
        })
    }
}

/// Describe a reply target by its author and the first line of its text.
///
/// Messages posted by the bot itself are quoted under the bot's own name.
fn describe_reply(target: &SourceMessage, use_first_name: bool) -> ReplyDescriptor {
    let text = target
        .text
        .clone()
        .or_else(|| target.attachment.as_ref().map(|a| format!("[{}]", a.kind.label())))
        .unwrap_or_default();

    let author = target
        .from
        .as_ref()
        .map(|u| u.display_name(use_first_name))
        .or_else(|| target.chat.title.clone())
        .unwrap_or_default();

    let first_line = text.lines().next().unwrap_or_default();
    ReplyDescriptor {
        author,
        excerpt: truncate(first_line, REPLY_EXCERPT_LENGTH),
    }
}
