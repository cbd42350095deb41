//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGINT and SIGTERM handlers once, at startup
//! - Translate the first signal into a single lifecycle event
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Exactly one event is emitted; later signals are logged and absorbed,
//!   they never restart or force the shutdown sequence

use std::io;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::supervisor::LifecycleEvent;

/// Subscription to the process termination signals.
pub struct SignalWatcher {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalWatcher {
    /// Register the handlers. From here on the default "die immediately"
    /// disposition of both signals is replaced for the whole process.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        "CTRL_C"
    }

    /// Forward the first signal to `events`, then stay passive until the
    /// receiving side goes away.
    pub fn spawn(mut self, events: mpsc::Sender<LifecycleEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let signal = tokio::select! {
                signal = self.recv() => signal,
                _ = events.closed() => return,
            };
            tracing::warn!(signal, "Signal '{}' was caught. Exiting", signal);

            if events.send(LifecycleEvent::Signal(signal)).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    signal = self.recv() => {
                        tracing::info!(signal, "Signal received while already shutting down, ignoring");
                    }
                    _ = events.closed() => break,
                }
            }
        })
    }
}
