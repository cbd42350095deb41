//! Subprocess pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! DynamicImage + CancellationToken (ExecutionRequest)
//!     → codec.rs   (encode PNG on the blocking pool)
//!     → process.rs (spawn tool, stdin ← PNG, stdout/stderr → buffers)
//!     → command.rs (exit status → ExternalToolFailure, or decode stdout)
//!     → DynamicImage | PipelineError
//! ```
//!
//! # Design Decisions
//! - Exactly one process per call, never retried
//! - Cancellation kills the child; it is never left running detached
//! - No state shared between calls: each owns its buffers and its child

pub mod codec;
pub mod command;
pub mod error;
pub mod process;

use async_trait::async_trait;
use image::DynamicImage;
use tokio_util::sync::CancellationToken;

pub use command::RembgCommand;
pub use error::{ErrorKind, PipelineError, PipelineResult};

/// One unit of work: the decoded source image and the scope bounding it.
#[derive(Debug)]
pub struct ExecutionRequest {
    pub image: DynamicImage,
    pub cancel: CancellationToken,
}

impl ExecutionRequest {
    pub fn new(image: DynamicImage, cancel: CancellationToken) -> Self {
        Self { image, cancel }
    }
}

/// Turns a source image into the same image without its background.
///
/// Implementations must honour `request.cancel`: once it fires, any work
/// started on behalf of the request has to stop before `process` returns.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn process(&self, request: ExecutionRequest) -> PipelineResult<DynamicImage>;
}
