//! Shutdown coordination for the gateway.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Service lifecycle state. Transitions only move forward.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running = 0,
    ShuttingDown = 1,
    Stopped = 2,
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            0 => LifecycleState::Running,
            1 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

/// What started the shutdown sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// An OS termination signal, by name.
    Signal(&'static str),
    /// Requested through a [`ShutdownHandle`].
    Requested(String),
    /// A supervised unit failed; the message is the error chain.
    Fatal(String),
}

impl std::fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownCause::Signal(name) => write!(f, "signal {}", name),
            ShutdownCause::Requested(reason) => write!(f, "requested: {}", reason),
            ShutdownCause::Fatal(error) => write!(f, "fatal error: {}", error),
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Holds two tokens. The lifecycle token fires when shutdown begins and tells
/// the listener to stop accepting. The hard-stop token fires only when the
/// grace period runs out; every request scope is a child of it, so in-flight
/// tool processes survive the first and are killed by the second.
#[derive(Debug, Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    lifecycle: CancellationToken,
    hard_stop: CancellationToken,
    state: AtomicU8,
    cause: OnceLock<ShutdownCause>,
    ignored_triggers: AtomicUsize,
}

impl Shutdown {
    /// Create a new shutdown coordinator in the `Running` state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                lifecycle: CancellationToken::new(),
                hard_stop: CancellationToken::new(),
                state: AtomicU8::new(LifecycleState::Running as u8),
                cause: OnceLock::new(),
                ignored_triggers: AtomicUsize::new(0),
            }),
        }
    }

    /// The shared lifecycle context.
    pub fn token(&self) -> CancellationToken {
        self.inner.lifecycle.clone()
    }

    /// A fresh scope for one request.
    ///
    /// Not cancelled when shutdown begins, only when the grace period expires.
    pub fn request_scope(&self) -> CancellationToken {
        self.inner.hard_stop.child_token()
    }

    /// Move `Running → ShuttingDown` and cancel the lifecycle token.
    ///
    /// Returns `true` for the single caller that performed the transition.
    /// Every later call is counted and otherwise ignored.
    pub fn begin(&self, cause: ShutdownCause) -> bool {
        let won = self
            .inner
            .state
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            let _ = self.inner.cause.set(cause);
            self.inner.lifecycle.cancel();
        } else {
            self.inner.ignored_triggers.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cause = %cause, "Shutdown already in progress, trigger ignored");
        }
        won
    }

    /// Cut off every in-flight request scope.
    pub fn abort_in_flight(&self) {
        self.inner.hard_stop.cancel();
    }

    /// Mark the terminal state. Also cancels everything still outstanding.
    pub fn finish(&self) {
        self.inner.state.store(LifecycleState::Stopped as u8, Ordering::Release);
        self.inner.lifecycle.cancel();
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.load(Ordering::Acquire).into()
    }

    /// The cause recorded by the winning [`begin`](Self::begin) call.
    pub fn cause(&self) -> Option<&ShutdownCause> {
        self.inner.cause.get()
    }

    /// Triggers that arrived after shutdown had already begun.
    pub fn ignored_triggers(&self) -> usize {
        self.inner.ignored_triggers.load(Ordering::Relaxed)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() != LifecycleState::Running
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
