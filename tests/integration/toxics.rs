use crate::*;

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::io::AsyncWriteExt;
use venom_core::{Direction, ToxicPatch, ToxicRequest};

#[tokio::test]
async fn test_upstream_latency_delays_round_trip() {
    let (proxies, proxy) = echo_proxy("latency").await;
    proxy
        .toxics()
        .add_toxic(
            ToxicRequest::new("latency")
                .stream(Direction::Upstream)
                .attributes(json!({ "latency": 150 })),
        )
        .await
        .unwrap();

    let mut client = connect(&proxy).await.unwrap();
    let started = Instant::now();
    assert_eq!(round_trip(&mut client, b"slow").await.unwrap(), b"slow");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(150), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "too slow: {elapsed:?}");

    proxies.clear().await;
}

#[tokio::test]
async fn test_toxic_applies_to_live_connection() {
    let (proxies, proxy) = echo_proxy("live").await;
    let mut client = connect(&proxy).await.unwrap();

    let started = Instant::now();
    round_trip(&mut client, b"before").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));

    proxy
        .toxics()
        .add_toxic(ToxicRequest::new("latency").attributes(json!({ "latency": 200 })))
        .await
        .unwrap();

    let started = Instant::now();
    assert_eq!(round_trip(&mut client, b"after").await.unwrap(), b"after");
    assert!(started.elapsed() >= Duration::from_millis(200));

    proxy.toxics().remove_toxic("latency_downstream").await.unwrap();
    let started = Instant::now();
    assert_eq!(round_trip(&mut client, b"again").await.unwrap(), b"again");
    assert!(started.elapsed() < Duration::from_millis(100));

    proxies.clear().await;
}

#[tokio::test]
async fn test_zero_toxicity_never_applies() {
    let (proxies, proxy) = echo_proxy("harmless").await;
    proxy
        .toxics()
        .add_toxic(
            ToxicRequest::new("latency")
                .toxicity(0.0)
                .attributes(json!({ "latency": 1000 })),
        )
        .await
        .unwrap();

    let mut client = connect(&proxy).await.unwrap();
    let started = Instant::now();
    round_trip(&mut client, b"quick").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));

    proxies.clear().await;
}

#[tokio::test]
async fn test_limit_data_closes_after_limit() {
    let (proxies, proxy) = echo_proxy("limited").await;
    proxy
        .toxics()
        .add_toxic(ToxicRequest::new("limit_data").attributes(json!({ "bytes": 100 })))
        .await
        .unwrap();

    let mut client = connect(&proxy).await.unwrap();
    client.write_all(&[7u8; 150]).await.unwrap();

    let (received, _) = read_to_end(&mut client).await;
    assert_eq!(received, vec![7u8; 100]);
    wait_for_idle(&proxy).await;

    proxies.clear().await;
}

#[tokio::test]
async fn test_reset_peer_aborts_client() {
    let (proxies, proxy) = echo_proxy("rst").await;
    proxy
        .toxics()
        .add_toxic(ToxicRequest::new("reset_peer").attributes(json!({ "timeout": 0 })))
        .await
        .unwrap();

    let mut client = connect(&proxy).await.unwrap();
    client.write_all(b"trigger").await.unwrap();

    let (received, ended) = read_to_end(&mut client).await;
    assert!(received.is_empty());
    let err = ended.expect_err("expected a reset, got a clean close");
    assert_eq!(err.kind(), ErrorKind::ConnectionReset);
    wait_for_idle(&proxy).await;

    proxies.clear().await;
}

#[tokio::test]
async fn test_removing_timeout_closes_connection() {
    let (proxies, proxy) = echo_proxy("timeout").await;
    proxy
        .toxics()
        .add_toxic(
            ToxicRequest::new("timeout")
                .stream(Direction::Upstream)
                .attributes(json!({ "timeout": 0 })),
        )
        .await
        .unwrap();

    let mut client = connect(&proxy).await.unwrap();
    client.write_all(b"swallowed").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(proxy.connection_count(), 1);

    proxy.toxics().remove_toxic("timeout_upstream").await.unwrap();

    let (received, _) = read_to_end(&mut client).await;
    assert!(received.is_empty());
    wait_for_idle(&proxy).await;

    proxies.clear().await;
}

#[tokio::test]
async fn test_bandwidth_paces_transfer() {
    let (proxies, proxy) = echo_proxy("narrow").await;
    proxy
        .toxics()
        .add_toxic(ToxicRequest::new("bandwidth").attributes(json!({ "rate": 20 })))
        .await
        .unwrap();

    // 10 KB at 20 KB/s
    let payload = vec![1u8; 10_000];
    let mut client = connect(&proxy).await.unwrap();
    let started = Instant::now();
    assert_eq!(round_trip(&mut client, &payload).await.unwrap(), payload);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(400), "too fast: {elapsed:?}");

    proxies.clear().await;
}

#[tokio::test]
async fn test_update_changes_live_toxic() {
    let (proxies, proxy) = echo_proxy("tuned").await;
    proxy
        .toxics()
        .add_toxic(ToxicRequest::new("latency").attributes(json!({ "latency": 500 })))
        .await
        .unwrap();

    let spec = proxy
        .toxics()
        .update_toxic(
            "latency_downstream",
            ToxicPatch {
                attributes: json!({ "latency": 10 }),
                ..ToxicPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(spec.record().attributes["latency"], 10);

    let mut client = connect(&proxy).await.unwrap();
    let started = Instant::now();
    round_trip(&mut client, b"tuned").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(400));

    proxies.clear().await;
}
