//! `POST /rembg`.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};

use crate::http::request::RequestIdExt;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::pipeline::{codec, ExecutionRequest, PipelineError};

/// Remove the background from the image in the request body.
///
/// The pipeline scope is a child of the service hard-stop token, so it
/// outlives the start of a graceful shutdown but not the end of the grace
/// period. Its drop guard also cancels it if the client goes away.
pub async fn rembg(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request_id = headers.request_id().to_string();
    let fail = |error: PipelineError| log_failure(error, &request_id);

    let source = codec::decode_input(body).await.map_err(fail)?;
    tracing::debug!(
        request_id = %request_id,
        width = source.width(),
        height = source.height(),
        "Input image decoded"
    );

    let scope = state.shutdown.request_scope();
    let _cancel_on_drop = scope.clone().drop_guard();

    let output = state
        .remover
        .process(ExecutionRequest::new(source, scope))
        .await
        .map_err(fail)?;

    let png = codec::encode_png_blocking(output).await.map_err(fail)?;

    Ok(([(header::CONTENT_TYPE, codec::PNG_CONTENT_TYPE)], png).into_response())
}

fn log_failure(error: PipelineError, request_id: &str) -> ApiError {
    let err = ApiError::new(error, request_id);
    let kind = err.error().kind();
    if err.status().is_server_error() {
        tracing::error!(
            request_id = %request_id,
            kind = %kind,
            error = %err.error().chain(),
            stderr = err.error().stderr().unwrap_or_default(),
            "Unable to remove background"
        );
    } else {
        tracing::warn!(
            request_id = %request_id,
            kind = %kind,
            error = %err.error().chain(),
            "Rejected request"
        );
    }
    err
}
