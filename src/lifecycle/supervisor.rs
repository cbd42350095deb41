//! Service supervision: start the listener, wait for the first shutdown
//! trigger, drain within the grace period, stop.
//!
//! # State Transitions
//! ```text
//! Running → ShuttingDown: first LifecycleEvent (signal, request, unit failure)
//! ShuttingDown → Stopped: listener drained, or grace period expired
//! ```
//!
//! # Design Decisions
//! - The supervisor is the only consumer of lifecycle events; it performs the
//!   transition, every other component only sends
//! - A missing or unbindable listen address is fatal before any traffic
//! - Grace period expiry is logged and reported, not escalated: in-flight
//!   scopes are cancelled, the listener task is aborted, and the run returns

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{LifecycleState, Shutdown, ShutdownCause};
use crate::lifecycle::signals::SignalWatcher;
use crate::pipeline::BackgroundRemover;

/// Errors that end the service.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("listen address is not configured (set LISTEN_ADDRESS)")]
    MissingListenAddress,

    #[error("unable to start listener on {address}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP server failed")]
    Serve(#[source] io::Error),

    #[error("supervised unit `{unit}` failed: {reason}")]
    UnitFailed { unit: &'static str, reason: String },

    #[error("unable to install signal handlers")]
    SignalInstall(#[source] io::Error),
}

impl LifecycleError {
    /// True for failures that happened before the listener ever served.
    pub fn is_listener_startup(&self) -> bool {
        matches!(
            self,
            LifecycleError::MissingListenAddress | LifecycleError::Bind { .. }
        )
    }

    /// The error and all of its sources joined with `": "`.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// Messages consumed by the supervisor.
#[derive(Debug)]
pub enum LifecycleEvent {
    /// An OS termination signal, by name.
    Signal(&'static str),
    /// Programmatic shutdown through a [`ShutdownHandle`].
    ShutdownRequested(String),
    /// A supervised unit hit an unrecoverable error.
    UnitFailed(LifecycleError),
}

impl LifecycleEvent {
    fn cause(&self) -> ShutdownCause {
        match self {
            LifecycleEvent::Signal(name) => ShutdownCause::Signal(*name),
            LifecycleEvent::ShutdownRequested(reason) => ShutdownCause::Requested(reason.clone()),
            LifecycleEvent::UnitFailed(err) => ShutdownCause::Fatal(err.chain()),
        }
    }

    fn from_unit_exit(unit: &'static str, joined: Result<(), JoinError>) -> Self {
        let reason = match joined {
            Ok(()) => "exited before shutdown was requested".to_string(),
            Err(e) if e.is_panic() => "panicked".to_string(),
            Err(e) => e.to_string(),
        };
        LifecycleEvent::UnitFailed(LifecycleError::UnitFailed { unit, reason })
    }
}

/// How the drain phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The listener closed and every in-flight request finished.
    Completed,
    /// The grace period ran out; remaining requests were cut off.
    TimedOut,
}

/// Summary of a service run that ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub cause: ShutdownCause,
    pub drain: DrainOutcome,
    /// Shutdown triggers that arrived after the first one.
    pub ignored_triggers: usize,
}

/// Cloneable handle for requesting shutdown from outside the supervisor.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown: Shutdown,
    events: mpsc::Sender<LifecycleEvent>,
}

impl ShutdownHandle {
    /// Ask the supervisor to shut down. Safe to call any number of times.
    pub async fn request_shutdown(&self, reason: impl Into<String>) {
        let _ = self
            .events
            .send(LifecycleEvent::ShutdownRequested(reason.into()))
            .await;
    }

    pub fn state(&self) -> LifecycleState {
        self.shutdown.state()
    }

    /// Resolves once shutdown has begun.
    pub async fn shutting_down(&self) {
        self.shutdown.token().cancelled().await;
    }
}

/// The whole gateway: listener, signal watcher and supervisor.
pub struct Service {
    config: ServiceConfig,
    remover: Arc<dyn BackgroundRemover>,
    shutdown: Shutdown,
    events_tx: mpsc::Sender<LifecycleEvent>,
    events_rx: mpsc::Receiver<LifecycleEvent>,
    listener: Option<TcpListener>,
    watch_signals: bool,
}

impl Service {
    pub fn new(config: ServiceConfig, remover: Arc<dyn BackgroundRemover>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(8);
        Self {
            config,
            remover,
            shutdown: Shutdown::new(),
            events_tx,
            events_rx,
            listener: None,
            watch_signals: true,
        }
    }

    /// Serve on an already bound listener instead of `listener.bind_address`.
    pub fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Whether to install SIGINT/SIGTERM handlers (default: yes).
    pub fn watch_signals(mut self, enabled: bool) -> Self {
        self.watch_signals = enabled;
        self
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
            events: self.events_tx.clone(),
        }
    }

    /// Run until shutdown completes.
    ///
    /// Returns the report for signal- or request-driven shutdowns (including
    /// a timed-out drain) and the first fatal error otherwise.
    pub async fn run(self) -> Result<ShutdownReport, LifecycleError> {
        let Service {
            config,
            remover,
            shutdown,
            events_tx,
            mut events_rx,
            listener,
            watch_signals,
        } = self;

        if watch_signals {
            match SignalWatcher::install() {
                Ok(watcher) => {
                    watcher.spawn(events_tx.clone());
                }
                Err(e) => {
                    shutdown.begin(ShutdownCause::Fatal(e.to_string()));
                    shutdown.finish();
                    return Err(LifecycleError::SignalInstall(e));
                }
            }
        }

        let server = HttpServer::new(&config, remover, shutdown.clone());
        let mut listener_unit = tokio::spawn(listener_unit(
            server,
            config.listener.bind_address.clone(),
            listener,
            shutdown.token(),
            events_tx.clone(),
        ));

        let mut listener_done = false;
        let first = tokio::select! {
            Some(event) = events_rx.recv() => event,
            joined = &mut listener_unit => {
                listener_done = true;
                // The unit reports its own failure before exiting; prefer that.
                events_rx
                    .try_recv()
                    .unwrap_or_else(|_| LifecycleEvent::from_unit_exit("listener", joined))
            }
        };

        let cause = first.cause();
        let first_error = match first {
            LifecycleEvent::UnitFailed(err) => {
                tracing::error!(error = %err.chain(), "Exiting.");
                Some(err)
            }
            _ => None,
        };

        shutdown.begin(cause.clone());
        tracing::info!(cause = %cause, "Shutting down");

        let drain = if listener_done {
            DrainOutcome::Completed
        } else {
            drain(
                &shutdown,
                &mut listener_unit,
                &mut events_rx,
                config.shutdown.grace_period(),
            )
            .await
        };

        shutdown.finish();
        tracing::info!(drain = ?drain, "Shutdown complete");

        match first_error {
            Some(err) => Err(err),
            None => Ok(ShutdownReport {
                cause,
                drain,
                ignored_triggers: shutdown.ignored_triggers(),
            }),
        }
    }
}

/// Wait for the listener to drain, bounded by `grace`. Triggers arriving in
/// the meantime are recorded as ignored.
async fn drain(
    shutdown: &Shutdown,
    listener_unit: &mut JoinHandle<()>,
    events_rx: &mut mpsc::Receiver<LifecycleEvent>,
    grace: Duration,
) -> DrainOutcome {
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            joined = &mut *listener_unit => {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "Listener task failed while draining");
                }
                return DrainOutcome::Completed;
            }
            Some(event) = events_rx.recv() => {
                shutdown.begin(event.cause());
            }
            _ = &mut deadline => {
                tracing::warn!(
                    grace_period_secs = grace.as_secs(),
                    "Graceful shutdown timed out, cutting off in-flight requests"
                );
                shutdown.abort_in_flight();
                listener_unit.abort();
                return DrainOutcome::TimedOut;
            }
        }
    }
}

/// Bind (unless pre-bound) and serve until the lifecycle token fires.
async fn listener_unit(
    server: HttpServer,
    bind_address: Option<String>,
    prebound: Option<TcpListener>,
    token: CancellationToken,
    events: mpsc::Sender<LifecycleEvent>,
) {
    let listener = match prebound {
        Some(listener) => listener,
        None => match bind(bind_address).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err.chain(), "Unable to start HTTP server");
                let _ = events.send(LifecycleEvent::UnitFailed(err)).await;
                return;
            }
        },
    };

    if let Err(e) = server.run(listener, token).await {
        let err = LifecycleError::Serve(e);
        tracing::error!(error = %err.chain(), "HTTP server stopped with an error");
        let _ = events.send(LifecycleEvent::UnitFailed(err)).await;
    }
}

async fn bind(address: Option<String>) -> Result<TcpListener, LifecycleError> {
    let address = address
        .filter(|a| !a.is_empty())
        .ok_or(LifecycleError::MissingListenAddress)?;

    TcpListener::bind(&address)
        .await
        .map_err(|source| LifecycleError::Bind { address, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ExecutionRequest, PipelineResult};
    use async_trait::async_trait;
    use image::DynamicImage;

    struct Identity;

    #[async_trait]
    impl BackgroundRemover for Identity {
        async fn process(&self, request: ExecutionRequest) -> PipelineResult<DynamicImage> {
            Ok(request.image)
        }
    }

    fn service(config: ServiceConfig) -> Service {
        Service::new(config, Arc::new(Identity)).watch_signals(false)
    }

    #[tokio::test]
    async fn test_missing_listen_address_is_fatal() {
        let service = service(ServiceConfig::default());
        let handle = service.handle();

        let err = service.run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::MissingListenAddress));
        assert!(err.is_listener_startup());
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = ServiceConfig::default();
        config.listener.bind_address = Some(taken.local_addr().unwrap().to_string());

        let err = service(config).run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Bind { .. }));
        assert!(err.chain().contains("unable to start listener"));
    }

    #[tokio::test]
    async fn test_requested_shutdown_drains() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = Some("127.0.0.1:0".into());
        let service = service(config);
        let handle = service.handle();

        let run = tokio::spawn(service.run());
        handle.request_shutdown("test").await;
        handle.request_shutdown("again").await;

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.cause, ShutdownCause::Requested("test".into()));
        assert_eq!(report.drain, DrainOutcome::Completed);
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_unit_exit_reason() {
        let event = LifecycleEvent::from_unit_exit("listener", Ok(()));
        match event {
            LifecycleEvent::UnitFailed(LifecycleError::UnitFailed { unit, reason }) => {
                assert_eq!(unit, "listener");
                assert!(reason.contains("exited"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
