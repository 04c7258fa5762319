//! Terminal delivery stage.
//!
//! Each bridge gets its own detached task; a failure on one bridge is logged
//! and never affects the others. Nothing is retried.
//!
//! Bodies longer than Discord allows go out as several messages in order, the
//! file riding on the last one. Every part's id is recorded so edits can
//! rewrite the same parts later.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::context::{Collaborators, DeliveryBatch, MessageKind, Outcome, Prepared};
use super::formatter::{render, split_message, DISCORD_MAX_MESSAGE_LENGTH};
use crate::bridge::Bridge;
use crate::common::error::DeliveryError;
use crate::common::types::{DestMessageId, SourceMessageId};
use crate::platform::FileUpload;

impl Prepared {
    /// Stage 10: send new messages, or apply edits to earlier deliveries.
    pub fn dispatch(self) -> Outcome {
        match self.routed.base.kind {
            MessageKind::New => Outcome::Delivered(self.deliver()),
            MessageKind::Edit => Outcome::Edited(self.deliver_edits()),
        }
    }

    fn deliver(self) -> DeliveryBatch {
        let env = self.routed.base.env;
        let source_id = self.routed.base.source_id;
        let payload = self.payload;

        let handles = self
            .routed
            .bridges
            .into_iter()
            .map(|bridge| {
                let content = render(&bridge, payload.author.as_deref(), &payload.body);
                let parts = split_message(&content, DISCORD_MAX_MESSAGE_LENGTH);
                tokio::spawn(send_to_bridge(
                    Arc::clone(&env),
                    bridge,
                    source_id,
                    parts,
                    payload.file.clone(),
                ))
            })
            .collect();

        DeliveryBatch { handles }
    }

    /// Edits go only to bridges that recorded a delivery for this message.
    fn deliver_edits(self) -> DeliveryBatch {
        let env = self.routed.base.env;
        let source_id = self.routed.base.source_id;
        let payload = self.payload;

        let mut handles = Vec::new();
        for bridge in self.routed.bridges {
            let Some(delivered) = env.identities.lookup(&bridge.name, source_id) else {
                debug!(
                    bridge = %bridge.name,
                    message = source_id,
                    "Edit of a message never relayed on this bridge, dropping"
                );
                continue;
            };
            let content = render(&bridge, payload.author.as_deref(), &payload.body);
            let parts = split_message(&content, DISCORD_MAX_MESSAGE_LENGTH);
            handles.push(tokio::spawn(edit_on_bridge(
                Arc::clone(&env),
                bridge,
                source_id,
                delivered,
                parts,
            )));
        }

        DeliveryBatch { handles }
    }
}

async fn send_to_bridge(
    env: Arc<Collaborators>,
    bridge: Arc<Bridge>,
    source_id: SourceMessageId,
    parts: Vec<String>,
    file: Option<Arc<FileUpload>>,
) -> Result<(), DeliveryError> {
    let last = parts.len().saturating_sub(1);
    let mut sent = Vec::with_capacity(parts.len());

    for (i, part) in parts.iter().enumerate() {
        let upload = if i == last { file.as_deref() } else { None };
        match env.destination.send_message(bridge.dest_channel, part, upload).await {
            Ok(dest_id) => sent.push(dest_id),
            Err(source) => {
                // Parts already posted stay editable
                if !sent.is_empty() {
                    env.identities.record(&bridge.name, source_id, sent);
                }
                let e = DeliveryError::Send {
                    bridge: bridge.name.clone(),
                    source,
                };
                error!("{}", e);
                return Err(e);
            }
        }
    }

    env.identities.record(&bridge.name, source_id, sent);
    debug!(tracked = env.identities.len(), "Recorded relayed message");
    info!("Telegram -> Discord [{}]: {}", bridge.name, parts.join("\n"));
    Ok(())
}

/// Rewrite each delivered part with the matching part of the new text.
///
/// Extra parts are posted as new messages and recorded. When the new text
/// needs fewer parts, the surplus messages are left as they were.
async fn edit_on_bridge(
    env: Arc<Collaborators>,
    bridge: Arc<Bridge>,
    source_id: SourceMessageId,
    delivered: Vec<DestMessageId>,
    parts: Vec<String>,
) -> Result<(), DeliveryError> {
    let result = apply_edit(&env, &bridge, source_id, &delivered, &parts).await;
    match &result {
        Ok(()) => info!("Telegram -> Discord [{}] (edit): {}", bridge.name, parts.join("\n")),
        Err(e) => error!("{}", e),
    }
    result
}

async fn apply_edit(
    env: &Collaborators,
    bridge: &Bridge,
    source_id: SourceMessageId,
    delivered: &[DestMessageId],
    parts: &[String],
) -> Result<(), DeliveryError> {
    let mut ids = delivered.to_vec();

    for (i, part) in parts.iter().enumerate() {
        match delivered.get(i) {
            Some(&dest_id) => env
                .destination
                .edit_message(bridge.dest_channel, dest_id, part)
                .await
                .map_err(|source| DeliveryError::Edit {
                    bridge: bridge.name.clone(),
                    source,
                })?,
            None => {
                let dest_id = env
                    .destination
                    .send_message(bridge.dest_channel, part, None)
                    .await
                    .map_err(|source| DeliveryError::Send {
                        bridge: bridge.name.clone(),
                        source,
                    })?;
                ids.push(dest_id);
                env.identities.record(&bridge.name, source_id, ids.clone());
            }
        }
    }

    if delivered.len() > parts.len() {
        debug!(
            bridge = %bridge.name,
            message = source_id,
            unchanged = delivered.len() - parts.len(),
            "Edited text is shorter than the original, trailing parts left as they were"
        );
    }
    Ok(())
}
