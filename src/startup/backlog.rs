//! Stale backlog draining.
//!
//! Events queued while the bridge was offline are fetched and thrown away
//! so continuous retrieval starts with nothing stale left to replay.

use tracing::{debug, info, warn};

use crate::common::error::PlatformError;
use crate::platform::SourcePlatform;

/// Result of draining the backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogSummary {
    /// Offset to start continuous retrieval from.
    pub next_offset: i64,
    /// Events discarded.
    pub discarded: usize,
    /// Fetches issued, including the final empty one.
    pub fetches: usize,
}

/// Fetch and discard batches until an empty one comes back.
///
/// Each fetch starts one past the highest id seen so far, which also
/// acknowledges everything before it. A batch that would not move the offset
/// forward ends draining rather than looping on it.
pub async fn drain_backlog(
    source: &dyn SourcePlatform,
    start: i64,
    limit: u8,
) -> Result<BacklogSummary, PlatformError> {
    let mut summary = BacklogSummary {
        next_offset: start,
        discarded: 0,
        fetches: 0,
    };

    loop {
        let batch = source.fetch_backlog_batch(summary.next_offset, limit).await?;
        summary.fetches += 1;

        let Some(max_id) = batch.iter().map(|e| e.update_id).max() else {
            break;
        };
        summary.discarded += batch.len();

        let next = max_id + 1;
        if next <= summary.next_offset {
            warn!(
                offset = summary.next_offset,
                max_id, "Backlog batch did not advance the offset, stopping drain"
            );
            break;
        }
        summary.next_offset = next;
        debug!(count = batch.len(), next_offset = next, "Discarded backlog batch");
    }

    info!(
        discarded = summary.discarded,
        next_offset = summary.next_offset,
        "Stale backlog drained"
    );
    Ok(summary)
}
