//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → CLI flags / environment overrides (loader.rs)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → moved into the Service at startup
//! ```
//!
//! # Design Decisions
//! - Config is built once at process entry; nothing reads the environment later
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, ConfigOverrides};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, PipelineConfig, ServiceConfig,
    ShutdownConfig,
};
pub use validation::ValidationError;
