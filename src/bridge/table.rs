//! Bridge routing table.
//!
//! Maps a Telegram chat (and optional forum topic) to the Discord channels it
//! is bridged with. The table is immutable; configuration reloads build a new
//! table and swap it in through [`SharedBridgeTable`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::common::types::{ChannelId, ChatId, Origin, ThreadId};
use crate::config::types::BridgeConfig;

/// Default format for relayed messages.
pub const DEFAULT_FORMAT: &str = "**%user**: %message";

/// Direction of message flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Telegram to Discord only.
    SourceToDest,
    /// Discord to Telegram only.
    DestToSource,
    /// Bidirectional.
    Both,
}

impl Direction {
    /// Parse direction from config string.
    pub fn from_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "telegram_to_discord" | "t2d" => Direction::SourceToDest,
            "discord_to_telegram" | "d2t" => Direction::DestToSource,
            _ => Direction::Both,
        }
    }

    /// Check if events originating on `origin` may be relayed.
    pub fn permits(&self, origin: Origin) -> bool {
        match origin {
            Origin::Source => matches!(self, Direction::SourceToDest | Direction::Both),
            Origin::Destination => matches!(self, Direction::DestToSource | Direction::Both),
        }
    }
}

/// Per-bridge delivery options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub relay_join_messages: bool,
    pub relay_leave_messages: bool,
    pub relay_commands: bool,
    pub send_usernames: bool,
    pub format: String,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            relay_join_messages: true,
            relay_leave_messages: true,
            relay_commands: false,
            send_usernames: true,
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

/// A configured link between a Telegram chat and a Discord channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bridge {
    /// Unique name; scopes message identity records.
    pub name: String,
    pub source_chat: ChatId,
    /// When set, only this forum topic is bridged.
    pub source_thread: Option<ThreadId>,
    pub dest_channel: ChannelId,
    pub direction: Direction,
    pub options: DeliveryOptions,
}

impl Bridge {
    /// Build a bridge from its config entry.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            name: config.name.clone(),
            source_chat: config.telegram.chat_id,
            source_thread: config.telegram.thread_id,
            dest_channel: config.discord.channel_id,
            direction: Direction::from_config(&config.direction),
            options: DeliveryOptions {
                relay_join_messages: config.telegram.relay_join_messages,
                relay_leave_messages: config.telegram.relay_leave_messages,
                relay_commands: config.telegram.relay_commands,
                send_usernames: config.discord.send_usernames,
                format: config
                    .discord
                    .format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            },
        }
    }

    /// Whether a message in `chat`/`thread` belongs to this bridge.
    ///
    /// A bridge without a thread covers every topic of its chat.
    fn matches_source(&self, chat: ChatId, thread: Option<ThreadId>) -> bool {
        self.source_chat == chat
            && match self.source_thread {
                Some(expected) => thread == Some(expected),
                None => true,
            }
    }
}

/// Ordered, immutable collection of bridges.
#[derive(Debug, Default)]
pub struct BridgeTable {
    /// All bridges in configuration order.
    bridges: Vec<Arc<Bridge>>,
    /// Index: source chat -> positions in `bridges`.
    by_chat: HashMap<ChatId, Vec<usize>>,
}

impl BridgeTable {
    /// Create a table from bridges, keeping their order.
    pub fn new(bridges: Vec<Bridge>) -> Self {
        let mut by_chat: HashMap<ChatId, Vec<usize>> = HashMap::new();
        for (idx, bridge) in bridges.iter().enumerate() {
            by_chat.entry(bridge.source_chat).or_default().push(idx);
        }

        Self {
            bridges: bridges.into_iter().map(Arc::new).collect(),
            by_chat,
        }
    }

    /// Create a table from configuration.
    pub fn from_config(configs: &[BridgeConfig]) -> Self {
        Self::new(configs.iter().map(Bridge::from_config).collect())
    }

    /// Bridges for a source chat/thread that permit events from `origin`.
    ///
    /// Results keep configuration order.
    pub fn resolve(&self, chat: ChatId, thread: Option<ThreadId>, origin: Origin) -> Vec<Arc<Bridge>> {
        self.by_chat
            .get(&chat)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| &self.bridges[i])
                    .filter(|b| b.matches_source(chat, thread) && b.direction.permits(origin))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

/// Process-wide routing state, swapped atomically on reload.
///
/// Readers take a snapshot (`Arc` clone) and resolve against it, so one
/// event never sees two different tables.
#[derive(Debug, Clone)]
pub struct SharedBridgeTable {
    current: Arc<RwLock<Arc<BridgeTable>>>,
}

impl SharedBridgeTable {
    pub fn new(table: Arc<BridgeTable>) -> Self {
        Self {
            current: Arc::new(RwLock::new(table)),
        }
    }

    /// Current table.
    pub fn snapshot(&self) -> Arc<BridgeTable> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the table, returning the previous one.
    pub fn replace(&self, table: Arc<BridgeTable>) -> Arc<BridgeTable> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, table)
    }
}
