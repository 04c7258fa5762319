//! Source -> destination message identity correlation.
//!
//! Records which Discord messages a relayed Telegram message produced, per
//! bridge, so that later Telegram edits can be applied to them. A long message
//! is posted in several parts, kept in order.

use std::sync::{Mutex, PoisonError};

use crate::common::bounded::BoundedMap;
use crate::common::types::{DestMessageId, SourceMessageId};

type IdentityKey = (String, SourceMessageId);

/// Bounded map of (bridge, source id) -> destination ids.
#[derive(Debug)]
pub struct MessageIdentityMap {
    records: Mutex<BoundedMap<IdentityKey, Vec<DestMessageId>>>,
}

impl MessageIdentityMap {
    /// Create a map remembering at most `capacity` records; oldest go first.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(BoundedMap::new(capacity)),
        }
    }

    /// Record the parts a message was delivered as, replacing any earlier record.
    pub fn record(&self, bridge: &str, source: SourceMessageId, dest: Vec<DestMessageId>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((bridge.to_string(), source), dest);
    }

    /// Destination ids for a source message, if it was relayed on this bridge.
    pub fn lookup(&self, bridge: &str, source: SourceMessageId) -> Option<Vec<DestMessageId>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(bridge.to_string(), source))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
