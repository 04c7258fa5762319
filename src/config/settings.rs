//! Live settings handed to the startup sequencer.
//!
//! The bridge table is published on a `watch` channel. Every reload sends a
//! complete replacement table; receivers never observe a partial update.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::bridge::BridgeTable;
use crate::common::error::ConfigError;
use crate::config::load_and_validate;
use crate::config::types::Config;

/// Settings snapshot consumed by the bridge at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Drain and discard the Telegram backlog before relaying.
    pub skip_old_messages: bool,
    /// Show senders by first name rather than @username.
    pub use_first_name: bool,
    /// Latest bridge table; changes on configuration reload.
    pub bridges: watch::Receiver<Arc<BridgeTable>>,
}

/// Write side of the settings channel.
#[derive(Debug)]
pub struct SettingsPublisher {
    path: PathBuf,
    bridges_tx: watch::Sender<Arc<BridgeTable>>,
}

/// Create the settings snapshot and its publisher from a loaded config.
pub fn settings_channel(config: &Config, path: impl Into<PathBuf>) -> (Settings, SettingsPublisher) {
    let table = Arc::new(BridgeTable::from_config(&config.bridges));
    let (bridges_tx, bridges) = watch::channel(table);

    let settings = Settings {
        skip_old_messages: config.telegram.skip_old_messages,
        use_first_name: config.telegram.use_first_name_instead_of_username,
        bridges,
    };
    let publisher = SettingsPublisher {
        path: path.into(),
        bridges_tx,
    };
    (settings, publisher)
}

impl SettingsPublisher {
    /// Re-read the config file and publish its bridge table.
    ///
    /// An invalid file leaves the current table in place.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let config = load_and_validate(&self.path)?;
        Ok(self.publish(BridgeTable::from_config(&config.bridges)))
    }

    /// Publish a replacement table. Returns the number of bridges in it.
    pub fn publish(&self, table: BridgeTable) -> usize {
        let count = table.len();
        if table.is_empty() {
            warn!("Published bridge table is empty, nothing will be relayed");
        }
        self.bridges_tx.send_replace(Arc::new(table));
        info!(bridges = count, "Published new bridge table");
        count
    }
}
