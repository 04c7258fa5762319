//! Cache of forum topic metadata.
//!
//! Telegram only reveals a topic's name in the service message that created
//! it, so names are remembered as those messages pass through the bridge.

use std::sync::{Mutex, PoisonError};

use crate::common::bounded::BoundedMap;
use crate::common::messages::SourceMessage;
use crate::common::types::{ChatId, ThreadId};

/// Cached metadata for one forum topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMeta {
    pub name: String,
}

#[derive(Debug)]
pub struct ThreadIndex {
    entries: Mutex<BoundedMap<(ChatId, ThreadId), ThreadMeta>>,
}

impl ThreadIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(BoundedMap::new(capacity)),
        }
    }

    pub fn get(&self, chat: ChatId, thread: ThreadId) -> Option<ThreadMeta> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(chat, thread))
            .cloned()
    }

    pub fn put(&self, chat: ChatId, thread: ThreadId, meta: ThreadMeta) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((chat, thread), meta);
    }

    /// Remember the topic name carried by a message, if any.
    ///
    /// Topic messages reference the topic-created service message as their
    /// reply target, so both the message and its reply target are checked.
    pub fn observe(&self, message: &SourceMessage) {
        let Some(thread) = message.thread_id else {
            return;
        };
        let name = message
            .forum_topic_created
            .as_ref()
            .or_else(|| message.reply_to.as_ref().and_then(|r| r.forum_topic_created.as_ref()));
        if let Some(name) = name {
            self.put(message.chat.id, thread, ThreadMeta { name: name.clone() });
        }
    }
}
