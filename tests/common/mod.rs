//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use rembg_gateway::config::ServiceConfig;
use rembg_gateway::lifecycle::{LifecycleError, ShutdownHandle, ShutdownReport};
use rembg_gateway::pipeline::{codec, BackgroundRemover, ExecutionRequest, PipelineError, PipelineResult};
use rembg_gateway::Service;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A small opaque PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = RgbaImage::from_fn(8, 6, |x, y| Rgba([x as u8 * 30, y as u8 * 40, 90, 255]));
    codec::encode_png(&DynamicImage::ImageRgba8(img)).unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// A running service on an ephemeral port.
pub struct TestService {
    pub addr: SocketAddr,
    pub handle: ShutdownHandle,
    pub task: JoinHandle<Result<ShutdownReport, LifecycleError>>,
}

impl TestService {
    pub fn url(&self) -> String {
        format!("http://{}/rembg", self.addr)
    }
}

/// Start a service with signal handling off and the given remover.
pub async fn start_service(
    mut config: ServiceConfig,
    remover: Arc<dyn BackgroundRemover>,
) -> TestService {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = Some(addr.to_string());

    let service = Service::new(config, remover)
        .with_listener(listener)
        .watch_signals(false);
    let handle = service.handle();
    let task = tokio::spawn(service.run());

    TestService { addr, handle, task }
}

/// Holds each request until its scope is cancelled or `delay` elapses.
pub struct SlowRemover {
    pub delay: Duration,
    pub started: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl SlowRemover {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            started: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        })
    }

    /// Wait until at least `n` requests are inside `process`.
    pub async fn wait_started(&self, n: usize) {
        while self.started.load(Ordering::SeqCst) < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl BackgroundRemover for SlowRemover {
    async fn process(&self, request: ExecutionRequest) -> PipelineResult<DynamicImage> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => Ok(request.image),
            _ = request.cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::Cancelled { command: "slow".into() })
            }
        }
    }
}
