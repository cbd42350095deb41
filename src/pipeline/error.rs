//! Pipeline error taxonomy.

use std::error::Error as StdError;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Discriminant used for status mapping, metrics labels and the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputDecodeFailure,
    ExternalToolFailure,
    OutputDecodeFailure,
    ToolSpawnFailure,
    ToolIoFailure,
    ToolTimeout,
    Cancelled,
    EncodeFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputDecodeFailure => "input_decode_failure",
            ErrorKind::ExternalToolFailure => "external_tool_failure",
            ErrorKind::OutputDecodeFailure => "output_decode_failure",
            ErrorKind::ToolSpawnFailure => "tool_spawn_failure",
            ErrorKind::ToolIoFailure => "tool_io_failure",
            ErrorKind::ToolTimeout => "tool_timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::EncodeFailure => "encode_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while turning one request image into one response image.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Request body is not a decodable image.
    #[error("unable to decode input image")]
    InputDecode(#[source] image::ImageError),

    /// Image could not be encoded to PNG.
    #[error("unable to encode image to PNG")]
    Encode(#[source] image::ImageError),

    /// The executable could not be started at all.
    #[error("unable to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the child's standard streams failed.
    #[error("I/O failure while talking to `{command}`")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited non-zero.
    #[error("failed to remove background with `{command}`: {status}{}", stderr_detail(.stderr))]
    ExternalTool {
        command: String,
        status: String,
        stderr: String,
    },

    /// The tool exited zero but its output is not an image.
    #[error("failed to decode answer from `{command}`")]
    OutputDecode {
        command: String,
        #[source]
        source: image::ImageError,
    },

    /// The execution scope was cancelled while the tool was running.
    #[error("`{command}` was cancelled")]
    Cancelled { command: String },

    /// The per-invocation deadline passed.
    #[error("`{command}` did not finish within {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },

    /// A blocking codec task panicked or was aborted.
    #[error("codec task failed")]
    Join(#[from] tokio::task::JoinError),
}

/// Trimmed stderr as a message suffix, empty when the tool wrote nothing.
fn stderr_detail(stderr: &str) -> String {
    match stderr.trim() {
        "" => String::new(),
        text => format!(" ({})", text),
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InputDecode(_) => ErrorKind::InputDecodeFailure,
            PipelineError::Encode(_) => ErrorKind::EncodeFailure,
            PipelineError::Spawn { .. } => ErrorKind::ToolSpawnFailure,
            PipelineError::Io { .. } => ErrorKind::ToolIoFailure,
            PipelineError::ExternalTool { .. } => ErrorKind::ExternalToolFailure,
            PipelineError::OutputDecode { .. } => ErrorKind::OutputDecodeFailure,
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
            PipelineError::Timeout { .. } => ErrorKind::ToolTimeout,
            PipelineError::Join(_) => ErrorKind::Internal,
        }
    }

    /// Diagnostic text the tool wrote before failing, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            PipelineError::ExternalTool { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// The error and all of its sources joined with `": "`.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
