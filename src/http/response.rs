//! Error responses.
//!
//! # Responsibilities
//! - Map pipeline error kinds to HTTP status codes
//! - Render a uniform JSON error envelope
//!
//! # Design Decisions
//! - 4xx only for input the client can fix; every tool problem is 5xx
//! - Errors are fully formed before anything is written, so a client gets
//!   either a whole image or an error, never a truncated body

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::pipeline::{ErrorKind, PipelineError};

/// Status code for each failure class.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InputDecodeFailure => StatusCode::BAD_REQUEST,
        ErrorKind::ExternalToolFailure | ErrorKind::OutputDecodeFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::ToolTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ToolSpawnFailure
        | ErrorKind::ToolIoFailure
        | ErrorKind::EncodeFailure
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
    pub request_id: String,
}

/// A pipeline failure bound to the request it happened in.
#[derive(Debug)]
pub struct ApiError {
    error: PipelineError,
    request_id: String,
}

impl ApiError {
    pub fn new(error: PipelineError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.error.kind())
    }

    pub fn error(&self) -> &PipelineError {
        &self.error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.error.kind(),
            message: self.error.chain(),
            request_id: self.request_id,
        };
        (status, Json(body)).into_response()
    }
}
