//! Startup sequencing.
//!
//! Brings the relay online in a safe order: learn the bot's own identity
//! while the stale backlog drains, register commands and permission
//! templates in the background, install the pipeline, follow configuration
//! reloads, signal ready, then retrieve events until the process stops.

pub mod backlog;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{AntiSpamGuard, BridgeTable, MessageIdentityMap, SharedBridgeTable, ThreadIndex};
use crate::common::error::{PlatformError, StartupError, StartupWarning};
use crate::common::types::BotIdentity;
use crate::config::{RelayConfig, Settings, StartupConfig};
use crate::pipeline::{command_set, Collaborators, EnrichmentPipeline, EventDispatcher};
use crate::platform::{
    AdminRights, BotCommandEntry, DestinationPlatform, PermissionScope, SourcePlatform,
};

pub use backlog::drain_backlog;

/// Events fetched per backlog request.
pub const BACKLOG_BATCH_LIMIT: u8 = 100;

/// Delays used during startup.
#[derive(Debug, Clone, Copy)]
pub struct StartupTimings {
    /// Wait before retrieval when the backlog is kept instead of drained.
    pub keep_backlog_delay: Duration,
    /// Wait between registering commands and checking them.
    pub verify_commands_delay: Duration,
}

impl StartupTimings {
    pub fn from_config(config: &StartupConfig) -> Self {
        Self {
            keep_backlog_delay: Duration::from_millis(config.keep_backlog_delay_ms),
            verify_commands_delay: Duration::from_secs(config.verify_commands_delay_secs),
        }
    }
}

impl Default for StartupTimings {
    fn default() -> Self {
        Self::from_config(&StartupConfig::default())
    }
}

pub struct StartupSequencer {
    source: Arc<dyn SourcePlatform>,
    destination: Arc<dyn DestinationPlatform>,
    settings: Settings,
    relay: RelayConfig,
    timings: StartupTimings,
}

impl StartupSequencer {
    pub fn new(
        source: Arc<dyn SourcePlatform>,
        destination: Arc<dyn DestinationPlatform>,
        settings: Settings,
        relay: RelayConfig,
        timings: StartupTimings,
    ) -> Self {
        Self {
            source,
            destination,
            settings,
            relay,
            timings,
        }
    }

    /// Run startup, then retrieval.
    ///
    /// `ready` receives the bot identity once the relay is safe to operate.
    /// On a fatal error it is dropped without a value.
    pub async fn run(self, ready: oneshot::Sender<BotIdentity>) -> Result<(), StartupError> {
        let Self {
            source,
            destination,
            mut settings,
            relay,
            timings,
        } = self;

        let (identity, offset) = tokio::join!(
            source.get_self_identity(),
            starting_offset(source.as_ref(), settings.skip_old_messages, timings.keep_backlog_delay),
        );
        let me = identity.map_err(StartupError::Identity)?;
        let offset = offset.map_err(StartupError::Backlog)?;
        info!("Logged in to Telegram as @{} ({})", me.username, me.id);

        spawn_best_effort(register_and_verify(
            Arc::clone(&source),
            timings.verify_commands_delay,
        ));
        for scope in [PermissionScope::Groups, PermissionScope::Channels] {
            spawn_best_effort(set_permission_template(Arc::clone(&source), scope));
        }

        let table = SharedBridgeTable::new(Arc::clone(&settings.bridges.borrow_and_update()));
        let pipeline = EnrichmentPipeline::install(Collaborators {
            source: Arc::clone(&source),
            destination,
            bridges: table.clone(),
            identities: Arc::new(MessageIdentityMap::new(relay.identity_capacity)),
            anti_spam: Arc::new(AntiSpamGuard::new(Duration::from_secs(relay.anti_spam_window_secs))),
            threads: Arc::new(ThreadIndex::new(relay.thread_index_capacity)),
            me: me.clone(),
            use_first_name: settings.use_first_name,
        });

        tokio::spawn(follow_reloads(settings.bridges, table));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(EventDispatcher::new(pipeline).run(events_rx));

        if ready.send(me).is_err() {
            debug!("Ready receiver dropped before startup finished");
        }
        info!("Bridge is ready");

        let retrieval = source.start_continuous_retrieval(offset, events_tx).await;

        // The sender is gone now; let the dispatcher finish what was queued
        if let Err(e) = dispatcher.await {
            warn!("Event dispatcher task failed: {}", e);
        }
        retrieval.map_err(StartupError::Retrieval)
    }
}

/// Drain the backlog, or wait the fixed delay when old messages are kept.
async fn starting_offset(
    source: &dyn SourcePlatform,
    skip_old_messages: bool,
    keep_backlog_delay: Duration,
) -> Result<i64, PlatformError> {
    if !skip_old_messages {
        tokio::time::sleep(keep_backlog_delay).await;
        return Ok(0);
    }
    let summary = drain_backlog(source, 0, BACKLOG_BATCH_LIMIT).await?;
    Ok(summary.next_offset)
}

/// Detach a background startup task. Its failure is only logged.
fn spawn_best_effort<F>(task: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), StartupWarning>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(warning) = task.await {
            warn!("{}", warning);
        }
    })
}

async fn register_and_verify(
    source: Arc<dyn SourcePlatform>,
    delay: Duration,
) -> Result<(), StartupWarning> {
    let expected = command_set();
    source
        .register_commands(&expected)
        .await
        .map_err(StartupWarning::Registration)?;
    info!(count = expected.len(), "Registered bot commands");

    tokio::time::sleep(delay).await;

    let actual = source
        .get_registered_commands()
        .await
        .map_err(StartupWarning::Verification)?;
    if actual != expected {
        return Err(StartupWarning::CommandMismatch {
            expected: command_names(&expected),
            actual: command_names(&actual),
        });
    }
    debug!("Registered commands verified");
    Ok(())
}

fn command_names(commands: &[BotCommandEntry]) -> Vec<String> {
    commands.iter().map(|c| c.command.clone()).collect()
}

async fn set_permission_template(
    source: Arc<dyn SourcePlatform>,
    scope: PermissionScope,
) -> Result<(), StartupWarning> {
    let rights = match scope {
        PermissionScope::Groups => AdminRights::for_groups(),
        PermissionScope::Channels => AdminRights::for_channels(),
    };
    source
        .set_default_permissions(&rights, scope)
        .await
        .map_err(|source| StartupWarning::Permissions {
            scope: scope.label(),
            source,
        })?;
    debug!(scope = scope.label(), "Default administrator rights set");
    Ok(())
}

/// Swap the routing table whenever settings publish a new one.
async fn follow_reloads(mut updates: watch::Receiver<Arc<BridgeTable>>, table: SharedBridgeTable) {
    while updates.changed().await.is_ok() {
        let next = Arc::clone(&updates.borrow_and_update());
        let count = next.len();
        table.replace(next);
        info!(bridges = count, "Bridge table swapped");
    }
    debug!("Settings publisher gone, no further reloads");
}
