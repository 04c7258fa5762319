//! Event enrichment pipeline.
//!
//! Turns one raw source event into relayed Discord posts or edits.
//!
//! ## Module Structure
//!
//! - `context`: Typed per-event context, one type per stage
//! - `stages`: Normalization, routing, filtering and enrichment stages
//! - `delivery`: Per-bridge delivery and edit propagation
//! - `formatter`: Per-bridge rendering of relayed messages
//! - `commands`: Administrative commands answered by the bot
//! - `dispatcher`: Single consumer of retrieved events

pub mod commands;
pub mod context;
pub mod delivery;
pub mod dispatcher;
pub mod formatter;
pub mod stages;

use std::sync::Arc;

use tracing::info;

use crate::common::error::PipelineError;
use crate::common::messages::SourceEvent;

pub use commands::command_set;
pub use context::{Collaborators, DeliveryReport, DropReason, Outcome};
pub use dispatcher::EventDispatcher;

use context::{Attached, Classified, Routing};

/// The installed stage sequence, bound to its collaborators.
pub struct EnrichmentPipeline {
    env: Arc<Collaborators>,
}

impl EnrichmentPipeline {
    pub fn install(env: Collaborators) -> Self {
        info!(
            bridges = env.bridges.snapshot().len(),
            "Relay pipeline installed"
        );
        Self { env: Arc::new(env) }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.env
    }

    /// Run one event through every stage in order.
    ///
    /// Delivery tasks are detached; the returned outcome carries their
    /// handles for callers that want to wait.
    pub async fn process(&self, event: SourceEvent) -> Result<Outcome, PipelineError> {
        let Some(normalized) = Attached::new(Arc::clone(&self.env), event).normalize() else {
            return Ok(Outcome::Dropped(DropReason::Unsupported));
        };

        let routed = match normalized.identify().resolve() {
            Routing::Bridged(routed) => routed,
            Routing::Private(identified) => return identified.inform().await,
            Routing::Unbridged => return Ok(Outcome::Dropped(DropReason::NoBridge)),
        };

        let Some(routed) = routed.filter() else {
            return Ok(Outcome::Dropped(DropReason::Filtered));
        };

        let prepared = match routed.classify() {
            Classified::Membership(notice) => match notice.prepare() {
                Some(prepared) => prepared,
                None => return Ok(Outcome::Dropped(DropReason::Filtered)),
            },
            Classified::Content(routed) => {
                let enriched = routed
                    .enrich()
                    .with_sender()
                    .with_reply()
                    .with_forward()
                    .with_text()
                    .with_attachment()
                    .await;
                match enriched.assemble() {
                    Some(prepared) => prepared,
                    None => return Ok(Outcome::Dropped(DropReason::Empty)),
                }
            }
        };

        Ok(prepared.dispatch())
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::fixtures::{harness, harness_from, harness_with};
    use super::*;
    use crate::bridge::table::fixtures::bridge;
    use crate::bridge::{BridgeTable, Direction};
    use crate::common::messages::fixtures::{event, group_message, private_message, user};
    use crate::common::messages::{
        AttachmentKind, AttachmentRef, ChatKind, ForwardOrigin, MembershipChange, SourceEventKind,
    };
    use crate::platform::testing::{RecordingDestination, RecordingSource};
    use crate::pipeline::formatter::DISCORD_MAX_UPLOAD_BYTES;

    fn new_message(update_id: i64, chat: i64, id: i32, text: &str) -> SourceEvent {
        event(update_id, SourceEventKind::Message(group_message(chat, id, text)))
    }

    fn edited_message(update_id: i64, chat: i64, id: i32, text: &str) -> SourceEvent {
        event(update_id, SourceEventKind::EditedMessage(group_message(chat, id, text)))
    }

    fn photo(file_id: &str, size: u32) -> AttachmentRef {
        AttachmentRef {
            kind: AttachmentKind::Photo,
            file_id: file_id.to_string(),
            file_name: None,
            size,
        }
    }

    async fn delivered(outcome: Outcome) -> DeliveryReport {
        match outcome {
            Outcome::Delivered(batch) => batch.join().await,
            other => panic!("expected delivery, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relay_then_edit() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let outcome = h.pipeline.process(new_message(1, 111, 5, "hi")).await.unwrap();
        assert_eq!(delivered(outcome).await.succeeded, 1);
        assert_eq!(h.destination.sends(), [(222, "**alice**: hi".to_string())]);
        assert_eq!(h.identities.lookup("B", 5), Some(vec![1000]));

        let outcome = h.pipeline.process(edited_message(2, 111, 5, "hi!")).await.unwrap();
        let Outcome::Edited(batch) = outcome else {
            panic!("expected edit");
        };
        assert_eq!(batch.join().await.succeeded, 1);

        assert_eq!(h.destination.edits(), [(222, 1000, "**alice**: hi!".to_string())]);
        assert_eq!(h.destination.sends().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_edit_is_dropped() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let outcome = h.pipeline.process(edited_message(1, 111, 77, "changed")).await.unwrap();
        let Outcome::Edited(batch) = outcome else {
            panic!("expected edit path");
        };
        assert!(batch.is_empty());

        assert!(h.destination.sends().is_empty());
        assert!(h.destination.edits().is_empty());
    }

    #[tokio::test]
    async fn test_dest_to_source_bridge_gets_nothing() {
        let h = harness(vec![bridge("inbound", 111, 222, Direction::DestToSource)]);

        let outcome = h.pipeline.process(new_message(1, 111, 5, "hi")).await.unwrap();
        assert!(matches!(outcome, Outcome::Dropped(DropReason::NoBridge)));
        assert!(h.destination.sends().is_empty());
    }

    #[tokio::test]
    async fn test_unbridged_chat_is_dropped() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let outcome = h.pipeline.process(new_message(1, 999, 5, "hi")).await.unwrap();
        assert!(matches!(outcome, Outcome::Dropped(DropReason::NoBridge)));
        assert!(h.source.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reload_separates_events_by_table() {
        let h = harness(vec![bridge("old", 111, 1, Direction::Both)]);

        let before = h.pipeline.process(new_message(1, 111, 1, "one")).await.unwrap();
        delivered(before).await;

        h.bridges.replace(Arc::new(BridgeTable::new(vec![
            bridge("new", 111, 2, Direction::Both),
            bridge("new-too", 111, 3, Direction::Both),
        ])));

        let after = h.pipeline.process(new_message(2, 111, 2, "two")).await.unwrap();
        assert_eq!(delivered(after).await.succeeded, 2);

        let sends = h.destination.sends();
        assert_eq!(sends[0], (1, "**alice**: one".to_string()));
        let mut later: Vec<_> = sends[1..].iter().map(|(channel, _)| *channel).collect();
        later.sort();
        assert_eq!(later, [2, 3]);
    }

    #[tokio::test]
    async fn test_one_failing_bridge_does_not_block_others() {
        let h = harness_with(
            RecordingDestination::failing(&[10]),
            vec![
                bridge("broken", 111, 10, Direction::Both),
                bridge("healthy", 111, 20, Direction::Both),
            ],
        );

        let outcome = h.pipeline.process(new_message(1, 111, 5, "hi")).await.unwrap();
        let report = delivered(outcome).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);

        assert_eq!(h.destination.sends().len(), 2);
        assert_eq!(h.identities.lookup("broken", 5), None);
        assert!(h.identities.lookup("healthy", 5).is_some());
    }

    #[tokio::test]
    async fn test_private_chat_informed_once() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);
        let dm = |update_id, id| event(update_id, SourceEventKind::Message(private_message(555, id, "hello?")));

        let first = h.pipeline.process(dm(1, 1)).await.unwrap();
        assert!(matches!(first, Outcome::Informed));

        let second = h.pipeline.process(dm(2, 2)).await.unwrap();
        assert!(matches!(second, Outcome::Dropped(DropReason::PrivateSuppressed)));

        let sent = h.source.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 555);
        assert!(h.destination.sends().is_empty());
    }

    #[tokio::test]
    async fn test_commands_only_reach_bridges_that_relay_them() {
        let mut relays = bridge("relays", 111, 1, Direction::Both);
        relays.options.relay_commands = true;
        let h = harness(vec![relays, bridge("quiet", 111, 2, Direction::Both)]);

        let outcome = h.pipeline.process(new_message(1, 111, 5, "/roll 2d6")).await.unwrap();
        assert_eq!(delivered(outcome).await.succeeded, 1);
        assert_eq!(h.destination.sends()[0].0, 1);

        let h = harness(vec![bridge("quiet", 111, 2, Direction::Both)]);
        let outcome = h.pipeline.process(new_message(1, 111, 5, "/roll")).await.unwrap();
        assert!(matches!(outcome, Outcome::Dropped(DropReason::Filtered)));
    }

    #[tokio::test]
    async fn test_membership_notice() {
        let mut no_joins = bridge("no-joins", 111, 1, Direction::Both);
        no_joins.options.relay_join_messages = false;
        let h = harness(vec![no_joins, bridge("all", 111, 2, Direction::Both)]);

        let mut joined = group_message(111, 9, "");
        joined.text = None;
        joined.membership = Some(MembershipChange::Joined(vec![user(50, "Bob", Some("bobby"))]));

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(joined)))
            .await
            .unwrap();
        assert_eq!(delivered(outcome).await.succeeded, 1);
        assert_eq!(
            h.destination.sends(),
            [(2, "**bobby** joined the Telegram side of the chat".to_string())]
        );
    }

    #[tokio::test]
    async fn test_membership_ignored_everywhere() {
        let mut quiet = bridge("quiet", 111, 1, Direction::Both);
        quiet.options.relay_leave_messages = false;
        let h = harness(vec![quiet]);

        let mut left = group_message(111, 9, "");
        left.text = None;
        left.membership = Some(MembershipChange::Left(user(50, "Bob", None)));

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(left)))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Dropped(DropReason::Filtered)));
    }

    #[tokio::test]
    async fn test_full_enrichment() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let mut target = group_message(111, 3, "earlier words\nsecond line");
        target.from = Some(user(60, "Bob", Some("bob")));

        let mut message = group_message(111, 4, "look");
        message.reply_to = Some(Box::new(target));
        message.forward = Some(ForwardOrigin::HiddenUser("Carol".to_string()));
        message.attachment = Some(photo("abc", 2_048));

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(message)))
            .await
            .unwrap();
        delivered(outcome).await;

        let body = "**alice**: *forwarded from Carol*\n> **bob**: earlier words\nlook";
        assert_eq!(h.destination.sends(), [(222, body.to_string())]);
        assert_eq!(
            h.destination.uploads(),
            [(222, "abc.bin".to_string(), body.to_string())]
        );
    }

    #[tokio::test]
    async fn test_reply_to_command_answer_quotes_the_bot() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let mut answer = group_message(111, 3, "Chat ID: 111\nTitle: Test group");
        answer.from = Some(user(7_000, "Ferry", Some("ferrybot")));

        let mut message = group_message(111, 4, "thanks");
        message.reply_to = Some(Box::new(answer));

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(message)))
            .await
            .unwrap();
        delivered(outcome).await;

        assert_eq!(
            h.destination.sends()[0].1,
            "**alice**: > **ferrybot**: Chat ID: 111\nthanks"
        );
    }

    #[tokio::test]
    async fn test_telegram_markup_is_escaped() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let mut message = group_message(111, 4, "@everyone free *nitro*");
        message.from = Some(user(66, "Evil", Some("__evil__")));

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(message)))
            .await
            .unwrap();
        delivered(outcome).await;

        assert_eq!(
            h.destination.sends()[0].1,
            "**\\_\\_evil\\_\\_**: @everyone free \\*nitro\\*"
        );
    }

    #[tokio::test]
    async fn test_long_message_is_split_and_every_part_edited() {
        let mut plain = bridge("B", 111, 222, Direction::Both);
        plain.options.send_usernames = false;
        let h = harness(vec![plain]);

        let long = "a".repeat(4096);
        let outcome = h.pipeline.process(new_message(1, 111, 5, &long)).await.unwrap();
        assert_eq!(delivered(outcome).await.succeeded, 1);

        let sends = h.destination.sends();
        let sizes: Vec<_> = sends.iter().map(|(_, content)| content.len()).collect();
        assert_eq!(sizes, [2000, 2000, 96]);
        assert_eq!(h.identities.lookup("B", 5), Some(vec![1000, 1001, 1002]));

        let shorter = "b".repeat(2500);
        let outcome = h.pipeline.process(edited_message(2, 111, 5, &shorter)).await.unwrap();
        let Outcome::Edited(batch) = outcome else {
            panic!("expected edit");
        };
        assert_eq!(batch.join().await.succeeded, 1);

        let edits: Vec<_> = h
            .destination
            .edits()
            .into_iter()
            .map(|(_, id, content)| (id, content.len()))
            .collect();
        assert_eq!(edits, [(1000, 2000), (1001, 500)]);
        assert_eq!(h.destination.sends().len(), 3);
    }

    #[tokio::test]
    async fn test_edit_that_grows_posts_extra_part() {
        let mut plain = bridge("B", 111, 222, Direction::Both);
        plain.options.send_usernames = false;
        let h = harness(vec![plain]);

        let outcome = h.pipeline.process(new_message(1, 111, 5, "short")).await.unwrap();
        delivered(outcome).await;

        let grown = "d".repeat(2500);
        let Outcome::Edited(batch) = h.pipeline.process(edited_message(2, 111, 5, &grown)).await.unwrap() else {
            panic!("expected edit");
        };
        assert_eq!(batch.join().await.succeeded, 1);

        assert_eq!(h.destination.edits(), [(222, 1000, "d".repeat(2000))]);
        assert_eq!(h.destination.sends()[1], (222, "d".repeat(500)));
        assert_eq!(h.identities.lookup("B", 5), Some(vec![1000, 1001]));
    }

    #[tokio::test]
    async fn test_edit_only_reaches_bridges_with_a_record() {
        let h = harness(vec![
            bridge("seen", 111, 1, Direction::Both),
            bridge("unseen", 111, 2, Direction::Both),
        ]);
        h.identities.record("seen", 5, vec![77]);

        let outcome = h.pipeline.process(edited_message(1, 111, 5, "fixed")).await.unwrap();
        let Outcome::Edited(batch) = outcome else {
            panic!("expected edit");
        };
        let report = batch.join().await;
        assert_eq!((report.succeeded, report.failed), (1, 0));

        assert_eq!(h.destination.edits(), [(1, 77, "**alice**: fixed".to_string())]);
        assert!(h.destination.sends().is_empty());
        assert_eq!(h.identities.lookup("unseen", 5), None);
    }

    #[tokio::test]
    async fn test_oversized_attachment_becomes_note() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let mut message = group_message(111, 4, "");
        message.text = None;
        message.attachment = Some(AttachmentRef {
            kind: AttachmentKind::Video,
            ..photo("big", DISCORD_MAX_UPLOAD_BYTES + 1)
        });

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(message)))
            .await
            .unwrap();
        delivered(outcome).await;

        assert_eq!(h.destination.sends()[0].1, "**alice**: [video too large to relay]");
        assert!(h.destination.uploads().is_empty());
        assert!(h.source.downloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_still_relays_text() {
        let source = RecordingSource {
            download_fails: true,
            ..RecordingSource::default()
        };
        let h = harness_from(
            source,
            RecordingDestination::default(),
            vec![bridge("B", 111, 222, Direction::Both)],
        );

        let mut message = group_message(111, 4, "nice view");
        message.attachment = Some(photo("sunset", 1_024));

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(message)))
            .await
            .unwrap();
        delivered(outcome).await;

        assert_eq!(
            h.destination.sends()[0].1,
            "**alice**: nice view\n[photo could not be relayed]"
        );
        assert!(h.destination.uploads().is_empty());
        assert_eq!(*h.source.downloads.lock().unwrap(), ["sunset"]);
    }

    #[tokio::test]
    async fn test_document_keeps_its_file_name() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let mut message = group_message(111, 4, "minutes");
        message.attachment = Some(AttachmentRef {
            kind: AttachmentKind::Document,
            file_name: Some("meeting.pdf".to_string()),
            ..photo("doc1", 4_096)
        });

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(message)))
            .await
            .unwrap();
        delivered(outcome).await;

        assert_eq!(
            h.destination.uploads(),
            [(222, "meeting.pdf".to_string(), "**alice**: minutes".to_string())]
        );
    }

    #[tokio::test]
    async fn test_topic_service_reply_is_not_quoted() {
        let mut topic = bridge("topic", 111, 222, Direction::Both);
        topic.source_thread = Some(7);
        let h = harness(vec![topic]);

        let mut created = group_message(111, 7, "");
        created.text = None;
        created.thread_id = Some(7);
        created.forum_topic_created = Some("Releases".to_string());

        let mut message = group_message(111, 8, "v1.2 is out");
        message.thread_id = Some(7);
        message.reply_to = Some(Box::new(created));

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::Message(message)))
            .await
            .unwrap();
        delivered(outcome).await;

        assert_eq!(h.destination.sends()[0].1, "**alice**: v1.2 is out");
        assert_eq!(
            h.pipeline.collaborators().threads.get(111, 7).unwrap().name,
            "Releases"
        );
    }

    #[tokio::test]
    async fn test_channel_post_is_authored_by_channel() {
        let h = harness(vec![bridge("news", -100500, 222, Direction::SourceToDest)]);

        let mut post = group_message(-100500, 1, "announcement");
        post.chat.kind = ChatKind::Channel;
        post.chat.title = Some("News".to_string());
        post.from = None;

        let outcome = h
            .pipeline
            .process(event(1, SourceEventKind::ChannelPost(post)))
            .await
            .unwrap();
        delivered(outcome).await;

        assert_eq!(h.destination.sends()[0].1, "**News**: announcement");
    }

    #[tokio::test]
    async fn test_empty_message_is_dropped() {
        let h = harness(vec![bridge("B", 111, 222, Direction::Both)]);

        let outcome = h.pipeline.process(new_message(1, 111, 4, "   ")).await.unwrap();
        assert!(matches!(outcome, Outcome::Dropped(DropReason::Empty)));

        let outcome = h.pipeline.process(event(2, SourceEventKind::Unsupported)).await.unwrap();
        assert!(matches!(outcome, Outcome::Dropped(DropReason::Unsupported)));
    }
}
