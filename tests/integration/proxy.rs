use crate::*;

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use venom_core::{ProxyConfig, ProxyPatch};
use venom_services::ProxyCollection;

#[tokio::test]
async fn test_echo_through_proxy() {
    let (proxies, proxy) = echo_proxy("echo").await;

    let mut client = connect(&proxy).await.unwrap();
    let reply = round_trip(&mut client, b"hello venom").await.unwrap();
    assert_eq!(reply, b"hello venom");
    assert_eq!(proxy.connection_count(), 1);

    drop(client);
    wait_for_idle(&proxy).await;
    proxies.clear().await;
}

/// 1 MiB each way, written and read concurrently.
#[tokio::test]
async fn test_large_transfer_is_intact() {
    let (proxies, proxy) = echo_proxy("bulk").await;
    let payload: Vec<u8> = (0..1 << 20).map(|i: u32| (i % 251) as u8).collect();

    let client = connect(&proxy).await.unwrap();
    let (mut rd, mut wr) = client.into_split();
    let expected = payload.clone();
    let writer = tokio::spawn(async move {
        wr.write_all(&payload).await.unwrap();
        wr
    });

    let mut received = vec![0u8; expected.len()];
    tokio::time::timeout(DEADLINE, rd.read_exact(&mut received))
        .await
        .expect("transfer timed out")
        .unwrap();
    assert!(received == expected, "payload corrupted in transit");

    drop(writer.await.unwrap());
    proxies.clear().await;
}

#[tokio::test]
async fn test_clients_are_independent() {
    let (proxies, proxy) = echo_proxy("many").await;

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let proxy = Arc::clone(&proxy);
        tasks.push(tokio::spawn(async move {
            let mut client = connect(&proxy).await.unwrap();
            let payload = vec![i; 1000];
            assert_eq!(round_trip(&mut client, &payload).await.unwrap(), payload);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    wait_for_idle(&proxy).await;
    proxies.clear().await;
}

#[tokio::test]
async fn test_disabled_proxy_refuses_clients() {
    let (proxies, proxy) = echo_proxy("off").await;
    let mut client = connect(&proxy).await.unwrap();
    round_trip(&mut client, b"ping").await.unwrap();

    proxy
        .update(ProxyPatch {
            enabled: Some(false),
            ..ProxyPatch::default()
        })
        .await
        .unwrap();

    // The live connection is closed and no new one is accepted.
    read_to_end(&mut client).await;
    wait_for_idle(&proxy).await;
    assert!(connect(&proxy).await.is_err());

    proxy
        .update(ProxyPatch {
            enabled: Some(true),
            ..ProxyPatch::default()
        })
        .await
        .unwrap();
    let mut client = connect(&proxy).await.unwrap();
    assert_eq!(round_trip(&mut client, b"back").await.unwrap(), b"back");

    proxies.clear().await;
}

#[tokio::test]
async fn test_unreachable_upstream_drops_client() {
    // Grab a free port and release it so nothing listens there.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

    let proxies = ProxyCollection::default();
    let proxy = proxies
        .add(ProxyConfig::new("dead", "127.0.0.1:0", dead.to_string()))
        .await
        .unwrap();

    let mut client = connect(&proxy).await.unwrap();
    let (received, _) = read_to_end(&mut client).await;
    assert!(received.is_empty());
    assert_eq!(proxy.connection_count(), 0);

    proxies.clear().await;
}
