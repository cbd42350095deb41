//! Background-removal gateway library.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────┐
//!                   │                    REMBG GATEWAY                     │
//!                   │                                                      │
//!  POST /rembg      │  ┌─────────┐    ┌─────────┐    ┌──────────────────┐  │
//!  ─────────────────┼─▶│  http   │───▶│ handler │───▶│     pipeline     │  │
//!                   │  │ server  │    │ decode  │    │ encode → spawn → │──┼──▶ rembg i
//!  image/png        │  └─────────┘    └─────────┘    │ wait   → decode  │◀─┼─── (stdin/stdout)
//!  ◀────────────────┼────────────────────────────────┴──────────────────┘  │
//!                   │                                                      │
//!                   │  ┌────────────────────────────────────────────────┐  │
//!                   │  │ lifecycle: signals → supervisor → shutdown     │  │
//!                   │  │ (lifecycle token → request scope → child kill) │  │
//!                   │  └────────────────────────────────────────────────┘  │
//!                   │  ┌──────────┐ ┌───────────────┐                      │
//!                   │  │  config  │ │ observability │                      │
//!                   │  └──────────┘ └───────────────┘                      │
//!                   └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Service, Shutdown, ShutdownHandle};
pub use pipeline::{BackgroundRemover, RembgCommand};
