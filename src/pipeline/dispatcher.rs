//! Single consumer of retrieved source events.
//!
//! Events are handled one at a time in transport order. Administrative
//! commands are answered directly; everything else runs through the
//! pipeline. Errors are logged and never stop the loop.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::commands::AdminCommand;
use super::context::Outcome;
use super::EnrichmentPipeline;
use crate::common::messages::{SourceEvent, SourceMessage};

pub struct EventDispatcher {
    pipeline: EnrichmentPipeline,
}

impl EventDispatcher {
    pub fn new(pipeline: EnrichmentPipeline) -> Self {
        Self { pipeline }
    }

    /// Consume events until every sender is dropped.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<SourceEvent>) {
        info!("Event dispatcher started");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Event channel closed, dispatcher stopping");
    }

    /// Handle one event. Returns the pipeline outcome, if it ran.
    pub async fn handle(&self, event: SourceEvent) -> Option<Outcome> {
        let update_id = event.update_id;

        if let Some((command, message)) = self.admin_command(&event) {
            let env = self.pipeline.collaborators();
            if let Err(e) = command.execute(env, message).await {
                error!("Admin command /{} failed: {}", command.name(), e);
            }
            return None;
        }

        match self.pipeline.process(event).await {
            Ok(outcome) => {
                if matches!(&outcome, Outcome::Edited(batch) if batch.is_empty()) {
                    debug!(update_id, "Edit matched no relayed message");
                }
                debug!(update_id, ?outcome, "Event processed");
                Some(outcome)
            }
            Err(e) => {
                error!(update_id, "Dropping event: {}", e);
                None
            }
        }
    }

    /// Admin commands are only taken from new messages, never edits.
    fn admin_command<'a>(&self, event: &'a SourceEvent) -> Option<(AdminCommand, &'a SourceMessage)> {
        if event.is_edit() {
            return None;
        }
        let message = event.message()?;
        let me = &self.pipeline.collaborators().me;
        AdminCommand::parse(message, &me.username).map(|command| (command, message))
    }
}
