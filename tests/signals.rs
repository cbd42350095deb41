//! Signal delivery to the watcher. Runs in its own test binary since it
//! signals the current process.

#![cfg(unix)]

use std::time::Duration;

use rembg_gateway::lifecycle::{LifecycleEvent, SignalWatcher};
use tokio::sync::mpsc;

fn send_sigterm() {
    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("kill must be available");
    assert!(status.success());
}

#[tokio::test]
async fn test_repeated_signals_produce_one_event() {
    let watcher = SignalWatcher::install().unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let task = watcher.spawn(tx);

    send_sigterm();
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first signal should be forwarded")
        .unwrap();
    assert!(matches!(event, LifecycleEvent::Signal("SIGTERM")));

    // The handler stays installed, so the process survives the second one.
    send_sigterm();
    let second = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(second.is_err(), "later signals must not produce events");

    drop(rx);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("watcher should stop once nobody listens")
        .unwrap();
}
