//! Rate limit for informational replies.
//!
//! The bot answers unbridged private chats with a short explanation; this
//! guard allows that reply at most once per window per chat.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::common::types::ChatId;

#[derive(Debug)]
pub struct AntiSpamGuard {
    window: Duration,
    /// Chat -> when it was last notified.
    notified: Mutex<HashMap<ChatId, Instant>>,
}

impl AntiSpamGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            notified: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the chat may be notified now, and marks it.
    ///
    /// Within the window of a previous `true` this returns `false` and leaves
    /// the mark untouched.
    pub fn should_notify(&self, chat: ChatId) -> bool {
        let now = Instant::now();
        let mut notified = self.notified.lock().unwrap_or_else(PoisonError::into_inner);

        // Expired entries are dropped so the map only holds live windows
        notified.retain(|_, at| now.duration_since(*at) < self.window);

        if notified.contains_key(&chat) {
            return false;
        }
        notified.insert(chat, now);
        true
    }
}
