//! Shutdown behaviour of a running gateway.

use std::sync::atomic::Ordering;
use std::time::Duration;

use rembg_gateway::config::ServiceConfig;
use rembg_gateway::lifecycle::{DrainOutcome, LifecycleState, ShutdownCause};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn test_in_flight_request_finishes_during_drain() {
    let remover = common::SlowRemover::new(Duration::from_millis(800));
    let service = common::start_service(ServiceConfig::default(), remover.clone()).await;

    let client = common::client();
    let request = tokio::spawn(client.post(service.url()).body(common::png_bytes()).send());
    remover.wait_started(1).await;

    // Two triggers in quick succession: only one shutdown sequence runs.
    service.handle.request_shutdown("first").await;
    service.handle.request_shutdown("second").await;
    service.handle.shutting_down().await;
    assert_eq!(service.handle.state(), LifecycleState::ShuttingDown);

    // The listener stops accepting while the request is still running.
    let mut refused = false;
    for _ in 0..50 {
        if TcpStream::connect(service.addr).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refused, "new connections should be refused once shutdown starts");

    let response = request.await.unwrap().expect("in-flight request should complete");
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");

    let report = service.task.await.unwrap().unwrap();
    assert_eq!(report.cause, ShutdownCause::Requested("first".into()));
    assert_eq!(report.drain, DrainOutcome::Completed);
    assert_eq!(report.ignored_triggers, 1);
    assert_eq!(remover.cancelled.load(Ordering::SeqCst), 0);
    assert_eq!(service.handle.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_grace_period_cuts_off_in_flight_work() {
    let mut config = ServiceConfig::default();
    config.shutdown.grace_period_secs = 1;

    let remover = common::SlowRemover::new(Duration::from_secs(60));
    let service = common::start_service(config, remover.clone()).await;

    let client = common::client();
    let request = tokio::spawn(client.post(service.url()).body(common::png_bytes()).send());
    remover.wait_started(1).await;

    let started = std::time::Instant::now();
    service.handle.request_shutdown("deploy").await;

    let report = tokio::time::timeout(Duration::from_secs(10), service.task)
        .await
        .expect("shutdown must not wait past the grace period")
        .unwrap()
        .unwrap();
    assert_eq!(report.drain, DrainOutcome::TimedOut);
    assert!(started.elapsed() >= Duration::from_secs(1));

    let response = request.await.unwrap().expect("cut-off request still gets an answer");
    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "cancelled");
    assert_eq!(remover.cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_idle_service_stops_promptly() {
    let remover = common::SlowRemover::new(Duration::from_millis(10));
    let service = common::start_service(ServiceConfig::default(), remover).await;

    service.handle.request_shutdown("idle").await;
    let report = tokio::time::timeout(Duration::from_secs(5), service.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.drain, DrainOutcome::Completed);
    assert_eq!(report.ignored_triggers, 0);
}
