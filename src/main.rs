//! Ferryman - Telegram to Discord chat bridge
//!
//! Relays messages from Telegram groups, forum topics and channels into
//! Discord channels and keeps later edits in sync.

mod bridge;
mod common;
mod config;
mod pipeline;
mod platform;
mod startup;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use common::error::AppError;
use config::{env::get_config_path, load_and_validate, settings_channel, SettingsPublisher};
use platform::{DiscordDestination, TelegramSource};
use startup::{StartupSequencer, StartupTimings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Ferryman v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        AppError::from(e)
    })?;

    info!("Configuration loaded successfully");
    for bridge in &config.bridges {
        info!(
            "  Bridge '{}': Telegram {}{} -> Discord {} ({})",
            bridge.name,
            bridge.telegram.chat_id,
            bridge
                .telegram
                .thread_id
                .map(|t| format!(" topic {}", t))
                .unwrap_or_default(),
            bridge.discord.channel_id,
            bridge.direction
        );
    }

    // ============================================================
    // Platform clients
    // ============================================================
    let telegram = TelegramSource::connect(&config.telegram.token)
        .await
        .map_err(|e| {
            error!("Failed to connect to Telegram: {}", e);
            AppError::from(e)
        })?;

    let discord = DiscordDestination::new(&config.discord.token);
    match discord.verify().await {
        Ok(name) => info!("Discord client ready, posting as {}", name),
        Err(e) => warn!("Could not verify Discord token: {}", e),
    }

    // ============================================================
    // Settings and reload trigger
    // ============================================================
    let (settings, publisher) = settings_channel(&config, &config_path);
    let reload_task = tokio::spawn(reload_on_hangup(publisher));

    // ============================================================
    // Start the bridge
    // ============================================================
    let sequencer = StartupSequencer::new(
        Arc::new(telegram),
        Arc::new(discord),
        settings,
        config.relay.clone(),
        StartupTimings::from_config(&config.startup),
    );

    let (ready_tx, ready_rx) = oneshot::channel();
    let mut bridge_task = tokio::spawn(sequencer.run(ready_tx));

    if ready_rx.await.is_err() {
        // The sequencer dropped the ready signal; its result says why
        let e = match bridge_task.await {
            Ok(Err(e)) => anyhow::Error::from(AppError::from(e)),
            Ok(Ok(())) => anyhow!("Startup ended without becoming ready"),
            Err(e) => anyhow::Error::from(e),
        };
        error!("Failed to start the bridge: {}", e);
        reload_task.abort();
        return Err(e);
    }

    let result = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping...");
            bridge_task.abort();
            Ok(())
        }
        joined = &mut bridge_task => match joined {
            Ok(Ok(())) => {
                info!("Event retrieval ended");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("{}", e);
                Err(AppError::from(e).into())
            }
            Err(e) => {
                error!("Bridge task panicked: {}", e);
                Err(e.into())
            }
        },
    };

    reload_task.abort();
    info!("Exiting...");
    result
}

/// Reload bridges from the config file on SIGHUP.
///
/// A file that fails to load or validate leaves the running bridges as they are.
#[cfg(unix)]
async fn reload_on_hangup(publisher: SettingsPublisher) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("Failed to install SIGHUP handler, live reload disabled: {}", e);
            // Keep the publisher alive so the bridge table stays subscribed
            std::future::pending::<()>().await;
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("SIGHUP received - reloading bridges...");
        match publisher.reload() {
            Ok(count) => info!("Reloaded {} bridge(s)", count),
            Err(e) => error!("Reload failed, keeping current bridges: {}", e),
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(publisher: SettingsPublisher) {
    let _publisher = publisher;
    std::future::pending::<()>().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
