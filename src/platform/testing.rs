//! Recording platform doubles for tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{AdminRights, BotCommandEntry, DestinationPlatform, FileUpload, PermissionScope, SourcePlatform};
use crate::common::error::{PlatformError, PlatformResult};
use crate::common::messages::SourceEvent;
use crate::common::types::{BotIdentity, ChannelId, ChatId, DestMessageId, SourceMessageId, ThreadId};

fn failure(message: &str) -> PlatformError {
    PlatformError::Unexpected {
        message: message.to_string(),
    }
}

pub fn bot_identity() -> BotIdentity {
    BotIdentity {
        id: 7_000,
        username: "ferrybot".to_string(),
        first_name: "Ferry".to_string(),
    }
}

/// Scriptable Telegram stand-in that records every call.
#[derive(Default)]
pub struct RecordingSource {
    pub identity_fails: bool,
    pub backlog_fails: bool,
    pub register_fails: bool,
    pub download_fails: bool,
    /// Returned by `get_registered_commands` instead of what was registered.
    pub registered_override: Option<Vec<BotCommandEntry>>,
    pub backlog: Mutex<VecDeque<Vec<SourceEvent>>>,
    pub live_events: Mutex<Vec<SourceEvent>>,

    pub backlog_fetches: Mutex<Vec<(i64, u8)>>,
    pub registered: Mutex<Vec<BotCommandEntry>>,
    pub permissions: Mutex<Vec<(PermissionScope, AdminRights)>>,
    pub retrieval_offset: Mutex<Option<i64>>,
    pub sent: Mutex<Vec<(ChatId, Option<ThreadId>, String)>>,
    pub downloads: Mutex<Vec<String>>,
}

impl RecordingSource {
    pub fn with_backlog(batches: Vec<Vec<SourceEvent>>) -> Self {
        Self {
            backlog: Mutex::new(batches.into()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(ChatId, Option<ThreadId>, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourcePlatform for RecordingSource {
    async fn get_self_identity(&self) -> PlatformResult<BotIdentity> {
        if self.identity_fails {
            return Err(failure("getMe failed"));
        }
        Ok(bot_identity())
    }

    async fn fetch_backlog_batch(&self, offset: i64, limit: u8) -> PlatformResult<Vec<SourceEvent>> {
        self.backlog_fetches.lock().unwrap().push((offset, limit));
        if self.backlog_fails {
            return Err(failure("getUpdates failed"));
        }
        Ok(self.backlog.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn register_commands(&self, commands: &[BotCommandEntry]) -> PlatformResult<()> {
        if self.register_fails {
            return Err(failure("setMyCommands failed"));
        }
        *self.registered.lock().unwrap() = commands.to_vec();
        Ok(())
    }

    async fn get_registered_commands(&self) -> PlatformResult<Vec<BotCommandEntry>> {
        if let Some(ref commands) = self.registered_override {
            return Ok(commands.clone());
        }
        Ok(self.registered.lock().unwrap().clone())
    }

    async fn set_default_permissions(
        &self,
        rights: &AdminRights,
        scope: PermissionScope,
    ) -> PlatformResult<()> {
        self.permissions.lock().unwrap().push((scope, rights.clone()));
        Ok(())
    }

    async fn start_continuous_retrieval(
        &self,
        offset: i64,
        sink: mpsc::UnboundedSender<SourceEvent>,
    ) -> PlatformResult<()> {
        *self.retrieval_offset.lock().unwrap() = Some(offset);
        let events: Vec<_> = self.live_events.lock().unwrap().drain(..).collect();
        for event in events {
            sink.send(event).map_err(|_| PlatformError::SinkClosed)?;
        }
        Ok(())
    }

    async fn send_message(
        &self,
        chat: ChatId,
        thread: Option<ThreadId>,
        _reply_to: Option<SourceMessageId>,
        text: &str,
    ) -> PlatformResult<SourceMessageId> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat, thread, text.to_string()));
        Ok(10_000 + sent.len() as SourceMessageId)
    }

    async fn edit_message(&self, _chat: ChatId, _message: SourceMessageId, _text: &str) -> PlatformResult<()> {
        Ok(())
    }

    /// Serves `<file_id>.bin` holding the id's bytes.
    async fn download_file(&self, file_id: &str) -> PlatformResult<FileUpload> {
        self.downloads.lock().unwrap().push(file_id.to_string());
        if self.download_fails {
            return Err(failure("getFile failed"));
        }
        Ok(FileUpload {
            name: format!("{}.bin", file_id),
            data: file_id.as_bytes().to_vec(),
        })
    }
}

/// Discord stand-in that records sends, uploads and edits.
pub struct RecordingDestination {
    next_id: AtomicU64,
    pub failing_channels: HashSet<ChannelId>,
    pub sends: Mutex<Vec<(ChannelId, String)>>,
    /// Channel, file name and the content the file was posted with.
    pub uploads: Mutex<Vec<(ChannelId, String, String)>>,
    pub edits: Mutex<Vec<(ChannelId, DestMessageId, String)>>,
}

impl Default for RecordingDestination {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1_000),
            failing_channels: HashSet::new(),
            sends: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingDestination {
    pub fn failing(channels: &[ChannelId]) -> Self {
        Self {
            failing_channels: channels.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn sends(&self) -> Vec<(ChannelId, String)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<(ChannelId, String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(ChannelId, DestMessageId, String)> {
        self.edits.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationPlatform for RecordingDestination {
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        file: Option<&FileUpload>,
    ) -> PlatformResult<DestMessageId> {
        self.sends.lock().unwrap().push((channel, content.to_string()));
        if let Some(file) = file {
            self.uploads
                .lock()
                .unwrap()
                .push((channel, file.name.clone(), content.to_string()));
        }
        if self.failing_channels.contains(&channel) {
            return Err(failure("channel unavailable"));
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: DestMessageId,
        content: &str,
    ) -> PlatformResult<()> {
        self.edits.lock().unwrap().push((channel, message, content.to_string()));
        if self.failing_channels.contains(&channel) {
            return Err(failure("channel unavailable"));
        }
        Ok(())
    }
}
