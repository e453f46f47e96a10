// src/server/connection_loop.rs

//! Contains the accept loop for sibling connections and the node's main loop with
//! graceful shutdown.

use super::context::ServerContext;
use crate::config::Config;
use crate::connection::{ConnectionHandler, RequestService};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::filter::EnvFilter;

/// Accepts sibling connections until a shutdown signal arrives, serving each on its
/// own task.
pub async fn serve(
    listener: TcpListener,
    service: Arc<RequestService>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut connection_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                break;
            }

            res = listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        if let Err(e) = socket.set_nodelay(true) {
                            warn!("Could not set TCP_NODELAY for {}: {}", addr, e);
                        }
                        info!("Accepted sibling connection from: {}", addr);
                        let mut handler = ConnectionHandler::new(
                            socket,
                            addr,
                            service.clone(),
                            shutdown_tx.subscribe(),
                        );
                        connection_tasks.spawn(async move {
                            if let Err(e) = handler.run().await {
                                warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            },

            Some(res) = connection_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A connection handler panicked: {e:?}");
                }
            },
        }
    }

    connection_tasks.shutdown().await;
    info!("All sibling connections closed.");
}

/// The node's main loop: serves siblings, supervises background tasks, reloads the
/// log level on SIGHUP, and shuts down on SIGINT or SIGTERM.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow!("Failed to register SIGHUP handler: {}", e))?;

    let listener = ctx.listener;
    let mut accept_task = tokio::spawn(serve(
        listener,
        ctx.service.clone(),
        ctx.shutdown_tx.clone(),
    ));

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = sighup.recv() => {
                reload_log_level(&ctx.config_path, &ctx.log_reload_handle);
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = &mut accept_task => {
                error!("CRITICAL: RPC listener stopped unexpectedly: {:?}. Shutting down.", res);
                break;
            }
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    if !accept_task.is_finished() {
        let _ = accept_task.await;
    }

    info!("Flushing pending object changes...");
    let now = crate::core::clock::now_millis();
    ctx.manager.sweep_expired(now).await;
    ctx.cluster.close();

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Node shutdown complete.");
    Ok(())
}

/// Re-reads `log_level` from the configuration file and applies it.
fn reload_log_level(
    config_path: &Option<String>,
    handle: &tracing_subscriber::reload::Handle<EnvFilter, tracing_subscriber::Registry>,
) {
    let Some(path) = config_path else {
        warn!("SIGHUP received but the node was started without a config file.");
        return;
    };
    match Config::from_file(path) {
        Ok(config) => match handle.reload(EnvFilter::new(&config.log_level)) {
            Ok(()) => info!("Log level reloaded to '{}'.", config.log_level),
            Err(e) => warn!("Failed to reload log level: {}", e),
        },
        Err(e) => warn!("SIGHUP: could not reload configuration: {:#}", e),
    }
}
