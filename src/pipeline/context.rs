//! Per-event delivery context.
//!
//! Each pipeline stage consumes one context type and returns the next, so a
//! stage can only run once every field it reads has been set:
//!
//! ```text
//! Attached -> Normalized -> Identified -> Routed -> Enriching<..> -> Enriched -> Prepared
//!                                                \-> MembershipNotice ------------/
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::bridge::{AntiSpamGuard, Bridge, MessageIdentityMap, SharedBridgeTable, ThreadIndex};
use crate::common::error::DeliveryError;
use crate::common::messages::{MembershipChange, SourceEvent, SourceMessage};
use crate::common::types::{BotIdentity, SourceMessageId};
use crate::platform::{DestinationPlatform, FileUpload, SourcePlatform};

/// Process-wide collaborators attached to every event.
pub struct Collaborators {
    pub source: Arc<dyn SourcePlatform>,
    pub destination: Arc<dyn DestinationPlatform>,
    pub bridges: SharedBridgeTable,
    pub identities: Arc<MessageIdentityMap>,
    pub anti_spam: Arc<AntiSpamGuard>,
    pub threads: Arc<ThreadIndex>,
    /// The bot's own account on the source platform.
    pub me: BotIdentity,
    /// Show senders by first name rather than @username.
    pub use_first_name: bool,
}

/// Whether the event creates a message or edits an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    New,
    Edit,
}

/// Stage 1: raw event with collaborators attached.
pub struct Attached {
    pub(super) env: Arc<Collaborators>,
    pub(super) event: SourceEvent,
}

/// Stage 2: the underlying message, with channel posts folded into messages.
pub struct Normalized {
    pub(super) env: Arc<Collaborators>,
    pub(super) kind: MessageKind,
    pub(super) message: SourceMessage,
}

/// Stage 3: canonical source id assigned.
pub struct Identified {
    pub(super) env: Arc<Collaborators>,
    pub(super) kind: MessageKind,
    pub(super) message: SourceMessage,
    pub(super) source_id: SourceMessageId,
}

/// Stage 4 result.
pub enum Routing {
    /// At least one bridge accepts the event.
    Bridged(Routed),
    /// A direct message to the bot. Never relayed.
    Private(Identified),
    /// No bridge covers this chat or topic.
    Unbridged,
}

/// Event with its candidate bridges.
pub struct Routed {
    pub(super) base: Identified,
    pub(super) bridges: Vec<Arc<Bridge>>,
}

/// Stage 7 split: membership events take a separate path.
pub enum Classified {
    Content(Routed),
    Membership(MembershipNotice),
}

/// A join or leave waiting to become a notice.
pub struct MembershipNotice {
    pub(super) routed: Routed,
    pub(super) change: MembershipChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderDescriptor {
    pub name: String,
}

/// The message being replied to, as shown above the relayed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDescriptor {
    pub author: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardDescriptor {
    pub from: String,
}

/// What becomes of the attached file on the destination side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentDescriptor {
    /// Downloaded and uploaded with the relayed message.
    Upload(Arc<FileUpload>),
    /// Could not be carried over; a short note names what was sent.
    Note(String),
}

/// Fields collected by the enrichment stages. Absent means nothing to enrich.
#[derive(Debug, Clone, Default)]
pub struct EnrichedFields {
    pub sender: Option<SenderDescriptor>,
    pub reply: Option<ReplyDescriptor>,
    pub forward: Option<ForwardDescriptor>,
    pub text: Option<String>,
    pub attachment: Option<AttachmentDescriptor>,
}

/// Enrichment stage markers.
pub struct NeedsSender;
pub struct NeedsReply;
pub struct NeedsForward;
pub struct NeedsText;
pub struct NeedsAttachment;

/// Stage 8 in progress. `S` names the next enrichment to run.
pub struct Enriching<S> {
    pub(super) routed: Routed,
    pub(super) fields: EnrichedFields,
    pub(super) _stage: PhantomData<S>,
}

impl<S> Enriching<S> {
    /// Move to the next stage with `update` applied to the collected fields.
    pub(super) fn advance<T>(self, update: impl FnOnce(EnrichedFields) -> EnrichedFields) -> Enriching<T> {
        Enriching {
            routed: self.routed,
            fields: update(self.fields),
            _stage: PhantomData,
        }
    }

    pub(super) fn message(&self) -> &SourceMessage {
        &self.routed.base.message
    }

    pub(super) fn env(&self) -> &Collaborators {
        &self.routed.base.env
    }
}

/// Stage 8 complete.
pub struct Enriched {
    pub(super) routed: Routed,
    pub(super) fields: EnrichedFields,
}

/// Bridge-independent payload. Each bridge renders it with its own format.
///
/// `author` and `body` are already escaped for Discord markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPayload {
    pub author: Option<String>,
    pub body: String,
    pub file: Option<Arc<FileUpload>>,
}

/// Stage 9: ready for delivery.
pub struct Prepared {
    pub(super) routed: Routed,
    pub(super) payload: RelayPayload,
}

/// Outcome of one delivery attempt set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Detached per-bridge delivery tasks for one event.
pub struct DeliveryBatch {
    pub(super) handles: Vec<JoinHandle<Result<(), DeliveryError>>>,
}

impl DeliveryBatch {
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every task. Deliveries run to completion whether or not this
    /// is called.
    pub async fn join(self) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for result in futures::future::join_all(self.handles).await {
            match result {
                Ok(Ok(())) => report.succeeded += 1,
                _ => report.failed += 1,
            }
        }
        report
    }
}

impl fmt::Debug for DeliveryBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryBatch")
            .field("tasks", &self.handles.len())
            .finish()
    }
}

/// Why an event was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Unsupported,
    NoBridge,
    /// Private chat already notified within the window, or a private edit.
    PrivateSuppressed,
    /// Every candidate bridge filtered the event out.
    Filtered,
    /// Nothing left to relay after enrichment.
    Empty,
}

/// Result of running one event through the pipeline.
#[derive(Debug)]
pub enum Outcome {
    Dropped(DropReason),
    /// Private chat was sent an explanatory reply.
    Informed,
    Delivered(DeliveryBatch),
    Edited(DeliveryBatch),
}
