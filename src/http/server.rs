//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the single `POST /rembg` handler
//! - Wire up middleware (request ID, tracing, metrics, body limit, CORS)
//! - Serve on a listener until the lifecycle token fires, then drain

use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{ListenerConfig, ServiceConfig};
use crate::http::handler;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pipeline::BackgroundRemover;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub remover: Arc<dyn BackgroundRemover>,
    pub shutdown: Shutdown,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ServiceConfig, remover: Arc<dyn BackgroundRemover>, shutdown: Shutdown) -> Self {
        let state = AppState { remover, shutdown };
        let router = Self::build_router(&config.listener, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/rembg", post(handler::rembg))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.max_body_size))
            .layer(middleware::from_fn(track_metrics))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request.headers().request_id(),
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer());

        if config.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires. Returns once in-flight requests have finished.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    metrics::record_request(response.status().as_u16(), start);
    response
}
