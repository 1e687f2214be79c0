use crate::*;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use venom_api::ApiState;
use venom_services::ProxyCollection;

/// A running admin API and the proxies behind it. Dropping it stops the server.
struct Api {
    base: String,
    proxies: Arc<ProxyCollection>,
    _shutdown: oneshot::Sender<()>,
}

impl Api {
    async fn start() -> Self {
        let proxies = Arc::new(ProxyCollection::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        let state = ApiState {
            proxies: Arc::clone(&proxies),
        };
        tokio::spawn(venom_api::serve_listener(state, listener, async move {
            let _ = rx.await;
        }));
        Self {
            base,
            proxies,
            _shutdown: tx,
        }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = reqwest::get(format!("{}{}", self.base, path)).await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = reqwest::Client::new()
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str) -> u16 {
        reqwest::Client::new()
            .delete(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
            .status()
            .as_u16()
    }
}

#[tokio::test]
async fn test_api_version() {
    let api = Api::start().await;
    let (status, body) = api.get("/version").await;
    assert_eq!(status, 200);
    assert!(body["version"].is_string());
}

/// Create a proxy and a toxic over HTTP, then watch the toxic act on traffic.
#[tokio::test]
async fn test_api_drives_proxy() {
    let api = Api::start().await;
    let upstream = spawn_echo().await;

    let (status, created) = api
        .post(
            "/proxies",
            json!({ "name": "echo", "listen": "127.0.0.1:0", "upstream": upstream.to_string() }),
        )
        .await;
    assert_eq!(status, 201);
    let listen = created["listen"].as_str().unwrap().to_string();

    let (status, toxic) = api
        .post(
            "/proxies/echo/toxics",
            json!({ "type": "latency", "stream": "upstream", "attributes": { "latency": 150 } }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(toxic["name"], "latency_upstream");

    let mut client = tokio::net::TcpStream::connect(&listen).await.unwrap();
    let started = Instant::now();
    assert_eq!(round_trip(&mut client, b"via api").await.unwrap(), b"via api");
    assert!(started.elapsed() >= Duration::from_millis(150));

    let (status, _) = api.post("/reset", Value::Null).await;
    assert_eq!(status, 204);
    let (_, proxy) = api.get("/proxies/echo").await;
    assert!(proxy["toxics"].as_array().unwrap().is_empty());

    let started = Instant::now();
    round_trip(&mut client, b"fast").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));

    assert_eq!(api.delete("/proxies/echo").await, 204);
    read_to_end(&mut client).await;
    assert_eq!(api.get("/proxies/echo").await.0, 404);
}

#[tokio::test]
async fn test_api_populate_replaces_changed_proxies() {
    let api = Api::start().await;
    let a = spawn_echo().await;
    let b = spawn_echo().await;

    let (status, body) = api
        .post(
            "/populate",
            json!([
                { "name": "one", "upstream": a.to_string() },
                { "name": "two", "upstream": a.to_string() },
            ]),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["proxies"].as_array().unwrap().len(), 2);
    let one = api.proxies.get("one").await.unwrap();

    let (status, _) = api
        .post(
            "/populate",
            json!([
                { "name": "one", "listen": one.listen().await, "upstream": a.to_string() },
                { "name": "two", "upstream": b.to_string() },
            ]),
        )
        .await;
    assert_eq!(status, 201);

    // Unchanged proxies are kept as they are; changed ones are rebuilt.
    assert!(Arc::ptr_eq(&one, &api.proxies.get("one").await.unwrap()));
    assert_eq!(api.proxies.get("two").await.unwrap().upstream().await, b.to_string());

    let (status, body) = api.post("/populate", json!([{ "name": "three" }])).await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], 400);
    assert_eq!(api.proxies.list().await.len(), 2);

    api.proxies.clear().await;
}

#[tokio::test]
async fn test_api_errors_are_json() {
    let api = Api::start().await;

    let (status, body) = api.get("/proxies/missing").await;
    assert_eq!(status, 404);
    assert_eq!(body, json!({ "error": "proxy not found", "status": 404 }));

    let (status, body) = api
        .post("/proxies", json!({ "name": "x", "upstream": "127.0.0.1:1", "listen": "127.0.0.1:99999" }))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["status"], 500);
}
