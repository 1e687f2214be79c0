//! venom integration test harness.
//!
//! Every test runs in-process over loopback TCP: an echo server stands in
//! for the upstream service, and clients talk to it through a real proxy.
//!
//!   cargo test --test integration

mod api;
mod proxy;
mod toxics;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use venom_core::ProxyConfig;
use venom_services::{Proxy, ProxyCollection};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound for any single wait in these tests.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Start a TCP echo server on an ephemeral loopback port.
pub async fn spawn_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = socket.into_split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    addr
}

/// A started proxy named `name` in front of a fresh echo server.
pub async fn echo_proxy(name: &str) -> (Arc<ProxyCollection>, Arc<Proxy>) {
    let upstream = spawn_echo().await;
    let proxies = Arc::new(ProxyCollection::default());
    let proxy = proxies
        .add(ProxyConfig::new(name, "127.0.0.1:0", upstream.to_string()))
        .await
        .unwrap();
    (proxies, proxy)
}

pub async fn connect(proxy: &Proxy) -> Result<TcpStream> {
    let addr = proxy.listen().await;
    TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to proxy at {addr}"))
}

/// Write `payload` and read the same number of bytes back.
pub async fn round_trip(client: &mut TcpStream, payload: &[u8]) -> Result<Vec<u8>> {
    client.write_all(payload).await?;
    let mut reply = vec![0u8; payload.len()];
    tokio::time::timeout(DEADLINE, client.read_exact(&mut reply))
        .await
        .context("timed out waiting for echo")??;
    Ok(reply)
}

/// Read until EOF or error, returning what arrived and how the stream ended.
pub async fn read_to_end(client: &mut TcpStream) -> (Vec<u8>, std::io::Result<()>) {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let read = tokio::time::timeout(DEADLINE, client.read(&mut buf))
            .await
            .expect("stream neither closed nor reset");
        match read {
            Ok(0) => return (received, Ok(())),
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) => return (received, Err(e)),
        }
    }
}

/// Wait until the proxy has dropped every connection.
pub async fn wait_for_idle(proxy: &Proxy) {
    tokio::time::timeout(DEADLINE, async {
        while proxy.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connections were not cleaned up");
}
