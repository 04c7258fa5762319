//! Administrative bot commands (/chatinfo, /threadinfo).
//!
//! These answer with the identifiers needed to configure a bridge and are
//! dispatched directly, never through the relay pipeline.

use tracing::{debug, info};

use super::context::Collaborators;
use crate::common::error::PipelineError;
use crate::common::messages::SourceMessage;
use crate::platform::BotCommandEntry;

/// Commands handled by the bot itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Identify the current chat.
    ChatInfo,
    /// Identify the current forum topic.
    ThreadInfo,
}

impl AdminCommand {
    pub const ALL: [AdminCommand; 2] = [AdminCommand::ChatInfo, AdminCommand::ThreadInfo];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatInfo => "chatinfo",
            Self::ThreadInfo => "threadinfo",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ChatInfo => "Show the id of this chat",
            Self::ThreadInfo => "Show the ids of this chat and topic",
        }
    }

    /// Parse a command addressed to this bot.
    pub fn parse(message: &SourceMessage, bot_username: &str) -> Option<Self> {
        let name = message.command_for(bot_username)?;
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Answer the command in the chat (and topic) it was sent from.
    pub async fn execute(&self, env: &Collaborators, message: &SourceMessage) -> Result<(), PipelineError> {
        let chat_id = message.chat.id;
        let reply = self.reply_text(env, message);
        debug!(command = self.name(), chat = chat_id, "Executing admin command");

        env.source
            .send_message(chat_id, message.thread_id, Some(message.id), &reply)
            .await
            .map_err(|source| PipelineError::Reply { chat_id, source })?;

        info!(command = self.name(), chat = chat_id, "Answered admin command");
        Ok(())
    }

    fn reply_text(&self, env: &Collaborators, message: &SourceMessage) -> String {
        let chat = &message.chat;
        match self {
            Self::ChatInfo => match &chat.title {
                Some(title) => format!("Chat ID: {}\nTitle: {}", chat.id, title),
                None => format!("Chat ID: {}", chat.id),
            },
            Self::ThreadInfo => match message.thread_id {
                Some(thread) => {
                    let topic = env
                        .threads
                        .get(chat.id, thread)
                        .map(|meta| meta.name)
                        .unwrap_or_else(|| "unknown".to_string());
                    format!("Chat ID: {}\nThread ID: {}\nTopic: {}", chat.id, thread, topic)
                }
                None => format!("Chat ID: {}\nThis message is not in a topic.", chat.id),
            },
        }
    }
}

/// The command list registered with the source platform.
pub fn command_set() -> Vec<BotCommandEntry> {
    AdminCommand::ALL
        .iter()
        .map(|c| BotCommandEntry::new(c.name(), c.description()))
        .collect()
}
