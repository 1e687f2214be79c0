//! Proxy: a TCP listener whose accepted connections are spliced to an
//! upstream address through the proxy's toxic chains.
//!
//! ```text
//! client ──► [upstream link]   ──► upstream server
//! client ◄── [downstream link] ◄── upstream server
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use venom_core::{Direction, ProxyConfig, ProxyError, ProxyPatch, ProxyRecord};

use crate::hangup::Hangup;
use crate::registry::ToxicRegistry;
use crate::toxic_collection::ToxicCollection;

const DEFAULT_LISTEN: &str = "127.0.0.1:0";

struct Server {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct State {
    /// Once started, the address actually bound.
    listen: String,
    upstream: String,
    server: Option<Server>,
}

pub struct Proxy {
    name: String,
    toxics: Arc<ToxicCollection>,
    /// Live connections by client address.
    connections: Arc<DashMap<String, Hangup>>,
    state: Mutex<State>,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("name", &self.name)
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl Proxy {
    /// A stopped proxy.
    pub fn new(config: ProxyConfig, registry: Arc<ToxicRegistry>) -> Self {
        let listen = if config.listen.is_empty() {
            DEFAULT_LISTEN.to_string()
        } else {
            config.listen
        };
        Self {
            toxics: Arc::new(ToxicCollection::new(config.name.clone(), registry)),
            name: config.name,
            connections: Arc::new(DashMap::new()),
            state: Mutex::new(State {
                listen,
                upstream: config.upstream,
                server: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn toxics(&self) -> &Arc<ToxicCollection> {
        &self.toxics
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.server.is_some()
    }

    /// The listen address; the bound address once started.
    pub async fn listen(&self) -> String {
        self.state.lock().await.listen.clone()
    }

    pub async fn upstream(&self) -> String {
        self.state.lock().await.upstream.clone()
    }

    pub async fn record(&self) -> ProxyRecord {
        let (listen, upstream, enabled) = {
            let state = self.state.lock().await;
            (
                state.listen.clone(),
                state.upstream.clone(),
                state.server.is_some(),
            )
        };
        let toxics = self
            .toxics
            .list_toxics()
            .await
            .iter()
            .map(|spec| spec.record())
            .collect();
        ProxyRecord {
            name: self.name.clone(),
            listen,
            upstream,
            enabled,
            toxics,
        }
    }

    /// Bind and start accepting. Starting a running proxy does nothing.
    pub async fn start(&self) -> Result<(), ProxyError> {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state).await
    }

    /// Stop accepting and close every live connection.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
    }

    /// Apply `patch`. A new listen or upstream address restarts the proxy;
    /// `enabled` starts or stops it.
    pub async fn update(&self, patch: ProxyPatch) -> Result<(), ProxyError> {
        let mut state = self.state.lock().await;
        let listen = patch
            .listen
            .filter(|listen| !listen.is_empty())
            .unwrap_or_else(|| state.listen.clone());
        let upstream = patch
            .upstream
            .filter(|upstream| !upstream.is_empty())
            .unwrap_or_else(|| state.upstream.clone());
        let enabled = patch.enabled.unwrap_or(state.server.is_some());

        if listen != state.listen || upstream != state.upstream {
            let was_running = state.server.is_some();
            self.stop_locked(&mut state).await;
            state.listen = listen;
            state.upstream = upstream;
            tracing::info!(
                proxy = %self.name,
                listen = %state.listen,
                upstream = %state.upstream,
                restart = was_running && enabled,
                "proxy updated"
            );
        }

        match (enabled, state.server.is_some()) {
            (true, false) => self.start_locked(&mut state).await,
            (false, true) => {
                self.stop_locked(&mut state).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn start_locked(&self, state: &mut State) -> Result<(), ProxyError> {
        if state.server.is_some() {
            return Ok(());
        }

        let bind_error = |e| ProxyError::Bind(state.listen.clone(), e);
        let listener = TcpListener::bind(&state.listen).await.map_err(bind_error)?;
        let local = listener.local_addr().map_err(bind_error)?;
        state.listen = local.to_string();

        let (shutdown, stopped) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            self.name.clone(),
            listener,
            state.upstream.clone(),
            Arc::clone(&self.toxics),
            Arc::clone(&self.connections),
            stopped,
        ));
        state.server = Some(Server { shutdown, task });

        tracing::info!(
            proxy = %self.name,
            listen = %state.listen,
            upstream = %state.upstream,
            "proxy started"
        );
        Ok(())
    }

    async fn stop_locked(&self, state: &mut State) {
        let Some(server) = state.server.take() else {
            return;
        };
        let _ = server.shutdown.send(());
        if let Err(e) = server.task.await {
            tracing::warn!(proxy = %self.name, error = %e, "accept loop failed");
        }
        for connection in self.connections.iter() {
            connection.value().close();
        }
        tracing::info!(proxy = %self.name, listen = %state.listen, "proxy stopped");
    }
}

async fn accept_loop(
    proxy: String,
    listener: TcpListener,
    upstream: String,
    toxics: Arc<ToxicCollection>,
    connections: Arc<DashMap<String, Hangup>>,
    mut stopped: oneshot::Receiver<()>,
) {
    loop {
        let (client, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(proxy = %proxy, error = %e, "accept failed");
                    continue;
                }
            },
            _ = &mut stopped => break,
        };
        tracing::debug!(proxy = %proxy, client = %peer, "accepted client");

        tokio::spawn(serve_client(
            proxy.clone(),
            client,
            peer,
            upstream.clone(),
            Arc::clone(&toxics),
            Arc::clone(&connections),
        ));
    }
}

async fn serve_client(
    proxy: String,
    client: TcpStream,
    peer: SocketAddr,
    upstream: String,
    toxics: Arc<ToxicCollection>,
    connections: Arc<DashMap<String, Hangup>>,
) {
    let upstream = match TcpStream::connect(&upstream).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!(
                proxy = %proxy,
                client = %peer,
                upstream = %upstream,
                error = %e,
                "unable to open connection to upstream"
            );
            return;
        }
    };

    let key = peer.to_string();
    let hangup = Hangup::new();
    connections.insert(key.clone(), hangup.clone());

    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();
    let up = toxics
        .start_link(
            format!("{key}upstream"),
            client_read,
            upstream_write,
            Direction::Upstream,
            hangup.clone(),
        )
        .await;
    let down = toxics
        .start_link(
            format!("{key}downstream"),
            upstream_read,
            client_write,
            Direction::Downstream,
            hangup,
        )
        .await;

    let _ = up.await;
    let _ = down.await;
    connections.remove(&key);
    tracing::debug!(proxy = %proxy, client = %peer, "client disconnected");
}
