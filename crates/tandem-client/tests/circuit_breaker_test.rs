//! Outbound resilience tests that need no live peer: transport failures
//! against unreachable targets, circuit opening, and retry accounting.

use serde_json::json;
use std::time::Instant;
use tandem_client::{CallOptions, TandemClient};
use tandem_common::config::{EndpointConfig, RetryOverrides};
use tandem_common::TandemError;

/// An address with nothing listening on it.
async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn fast_config(failure_threshold: u32, max_retries: u32) -> EndpointConfig {
    let mut config = EndpointConfig::default();
    config.resilience.circuit_breaker.failure_threshold = failure_threshold;
    config.resilience.retry.max_retries = max_retries;
    config.resilience.retry.initial_delay_ms = 10;
    config.resilience.retry.jitter = false;
    config.resilience.timeout.connection_timeout_ms = 1_000;
    config
}

#[tokio::test]
async fn test_connection_refused_is_classified_transport_error() {
    let client = TandemClient::new(fast_config(5, 0)).unwrap();
    let url = dead_url().await;

    let err = client
        .call(&url, "echo", json!({}), &CallOptions::default())
        .await
        .unwrap_err();

    match err {
        TandemError::Connection { .. } | TandemError::Transport(_) => {}
        other => panic!("Expected a transport-class error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_circuit_opens_after_threshold_and_gates_without_io() {
    let client = TandemClient::new(fast_config(2, 0)).unwrap();
    let url = dead_url().await;

    // Two failing calls trip the breaker.
    assert!(client
        .call(&url, "echo", json!({}), &CallOptions::default())
        .await
        .is_err());
    assert!(client
        .call(&url, "echo", json!({}), &CallOptions::default())
        .await
        .is_err());

    // The third call is gated: CIRCUIT_OPEN, immediately, no dial.
    let start = Instant::now();
    let err = client
        .call(&url, "echo", json!({}), &CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CIRCUIT_OPEN");
    assert!(start.elapsed().as_millis() < 100);

    let snapshot = client.breakers().snapshot();
    let entry = snapshot.get(&url).unwrap();
    assert_eq!(
        serde_json::to_value(&entry.state).unwrap(),
        json!("OPEN")
    );
}

#[tokio::test]
async fn test_breaker_trip_is_counted_once() {
    let client = TandemClient::new(fast_config(2, 0)).unwrap();
    let url = dead_url().await;

    for _ in 0..2 {
        let _ = client
            .call(&url, "echo", json!({}), &CallOptions::default())
            .await;
    }

    let metrics = client
        .metrics()
        .snapshot(client.breakers().snapshot(), Default::default());
    assert_eq!(metrics.circuit_breaker_trips, 1);
}

#[tokio::test]
async fn test_retries_are_counted() {
    let client = TandemClient::new(fast_config(100, 2)).unwrap();
    let url = dead_url().await;

    let err = client
        .call(&url, "echo", json!({}), &CallOptions::default())
        .await
        .unwrap_err();
    assert_ne!(err.code(), "CIRCUIT_OPEN");

    // Three attempts, two of them retries.
    let metrics = client
        .metrics()
        .snapshot(Default::default(), Default::default());
    assert_eq!(metrics.retry_count, 2);
}

#[tokio::test]
async fn test_per_call_retry_override_wins() {
    let client = TandemClient::new(fast_config(100, 5)).unwrap();
    let url = dead_url().await;

    let options = CallOptions {
        retry: RetryOverrides {
            max_retries: Some(0),
            ..Default::default()
        },
        ..Default::default()
    };
    let _ = client.call(&url, "echo", json!({}), &options).await;

    let metrics = client
        .metrics()
        .snapshot(Default::default(), Default::default());
    assert_eq!(metrics.retry_count, 0);
}

#[tokio::test]
async fn test_manual_reset_closes_the_circuit() {
    let client = TandemClient::new(fast_config(1, 0)).unwrap();
    let url = dead_url().await;

    let _ = client
        .call(&url, "echo", json!({}), &CallOptions::default())
        .await;
    assert_eq!(
        client
            .call(&url, "echo", json!({}), &CallOptions::default())
            .await
            .unwrap_err()
            .code(),
        "CIRCUIT_OPEN"
    );

    client.breakers().reset(&url);
    let snapshot = client.breakers().snapshot();
    let entry = snapshot.get(&url).unwrap();
    assert_eq!(serde_json::to_value(&entry.state).unwrap(), json!("CLOSED"));
    assert_eq!(entry.failure_count, 0);
    assert_eq!(entry.success_count, 0);

    // Gated no more: the next call reaches the network again.
    let err = client
        .call(&url, "echo", json!({}), &CallOptions::default())
        .await
        .unwrap_err();
    assert_ne!(err.code(), "CIRCUIT_OPEN");
}
