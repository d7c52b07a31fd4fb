// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wagate serve` command implementation.
//!
//! Wires the full gateway: SQLite store, WebSocket rooms, session
//! supervisor with restore-all, outbound queue, webhook dispatcher and
//! backfill job, HTTP edge, and signal-driven graceful shutdown.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use wagate_config::WagateConfig;
use wagate_core::{EventSink, MessageRecord, SessionStore, WaConnector, WagateError};
use wagate_gateway::{GatewayState, WsRooms};
use wagate_queue::OutboundQueue;
use wagate_session::SessionSupervisor;
use wagate_storage::SqliteStore;
use wagate_webhook::{run_sync_loop, WebhookDispatcher};

use crate::connector::LoopbackConnector;

/// Depth of the supervisor -> dispatcher feed.
const WEBHOOK_FEED_DEPTH: usize = 256;

/// Runs `wagate serve` with the built-in loopback connector.
pub async fn run_serve(config: WagateConfig) -> Result<(), WagateError> {
    run_serve_with(config, Arc::new(LoopbackConnector::new())).await
}

/// Runs the gateway with an explicit WhatsApp connector implementation.
pub async fn run_serve_with(
    config: WagateConfig,
    connector: Arc<dyn WaConnector>,
) -> Result<(), WagateError> {
    init_tracing(&config.server.log_level);
    info!("starting wagate serve");

    // The WhatsApp client library keeps file-backed auth material here.
    std::fs::create_dir_all(&config.storage.session_storage_path).map_err(|e| {
        WagateError::Config(format!(
            "cannot create session storage path {}: {e}",
            config.storage.session_storage_path
        ))
    })?;

    let sqlite = Arc::new(SqliteStore::open(&config.storage.database_path).await?);
    let store: Arc<dyn SessionStore> = sqlite.clone();

    let rooms = Arc::new(WsRooms::new());
    let cancel = install_signal_handler();

    // Webhook pipeline: supervisor feeds the dispatcher in arrival order.
    let (webhook_tx, webhook_rx) = mpsc::channel::<MessageRecord>(WEBHOOK_FEED_DEPTH);
    let dispatcher = WebhookDispatcher::new(store.clone(), config.webhook.clone(), cancel.clone())?;
    {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.run(webhook_rx).await;
        });
    }
    {
        let dispatcher = dispatcher.clone();
        let store = store.clone();
        let interval = config.webhook.sync_interval_secs;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_sync_loop(dispatcher, store, interval, cancel).await;
        });
    }

    let supervisor = SessionSupervisor::new(
        store.clone(),
        connector,
        rooms.clone() as Arc<dyn EventSink>,
        config.reconnect.clone(),
        Some(webhook_tx),
        cancel.clone(),
    );

    // Crash recovery: bring every restorable session back up.
    let restored = supervisor.restore_all().await;
    info!(restored, "startup session restoration complete");

    let queue = OutboundQueue::new(
        supervisor.clone(),
        store.clone(),
        config.queue.clone(),
        cancel.clone(),
    );

    let state = GatewayState {
        store: store.clone(),
        supervisor: supervisor.clone(),
        queue: queue.clone(),
        rooms,
        start_time: Instant::now(),
    };

    wagate_gateway::start_server(&config.server, state, cancel.clone()).await?;

    // The listener only returns once the cancellation token fired.
    info!("shutting down");
    supervisor.shutdown();
    queue.shutdown();
    sqlite.close().await?;
    info!("wagate serve shutdown complete");
    Ok(())
}

/// Installs handlers for SIGTERM and SIGINT (Ctrl+C).
///
/// Returns a token cancelled when either signal is received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "SIGTERM handler unavailable, using Ctrl+C only");
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wagate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
