//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (supervisor.rs):
//!     Install signal watcher → Bind listener → Serve
//!
//! Trigger (first wins, later ones are counted and ignored):
//!     SIGTERM/SIGINT (signals.rs) ─┐
//!     listener failure ────────────┼─→ LifecycleEvent → supervisor
//!     ShutdownHandle ──────────────┘
//!
//! Shutdown (shutdown.rs):
//!     Cancel lifecycle token → Stop accepting → Drain in-flight
//!         → grace period expired? cancel request scopes (kills tools)
//!         → Stopped
//! ```
//!
//! # Design Decisions
//! - One event channel, one consumer; the state transition is a compare-and-swap
//! - Request scopes hang off a separate hard-stop token, so shutdown does not
//!   interrupt work that can still finish within the grace period
//! - Shutdown has timeout: in-flight work is cut off after the deadline

pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use shutdown::{LifecycleState, Shutdown, ShutdownCause};
pub use signals::SignalWatcher;
pub use supervisor::{
    DrainOutcome, LifecycleError, LifecycleEvent, Service, ShutdownHandle, ShutdownReport,
};
