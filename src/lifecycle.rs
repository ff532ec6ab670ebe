//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Signals:
//!     SIGTERM/SIGINT → Shutdown::trigger → broadcast to listeners
//! Shutdown:
//!     listeners stop accepting → in-flight requests drain → main exits
//! ```

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGTERM or SIGINT, then trigger shutdown.
#[cfg(unix)]
pub async fn watch_signals(shutdown: Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to wait for ctrl-c");
            }
            shutdown.trigger();
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
        _ = terminate.recv() => {
            tracing::info!("SIGTERM received, shutting down");
        }
    }
    shutdown.trigger();
}

#[cfg(not(unix))]
pub async fn watch_signals(shutdown: Shutdown) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to wait for ctrl-c");
    }
    tracing::info!("shutdown signal received");
    shutdown.trigger();
}
