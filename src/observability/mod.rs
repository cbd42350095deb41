//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (text or JSON lines)
//!     → Metrics endpoint (Prometheus scrape), when configured
//! ```
//!
//! # Design Decisions
//! - Request ID is attached to the request span and to every error log
//! - Tool failures log the command line and the tool's stderr
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
