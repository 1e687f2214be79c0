//! ToxicCollection: the toxics declared on one proxy, and the live links
//! that run them.
//!
//! The declared chains are the single source of truth. Every mutation
//! updates them under one lock, then applies the same edit to every live
//! link of the affected direction concurrently and waits for all of them,
//! so a mutation is observed atomically across connections.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use venom_core::{Direction, ToxicError, ToxicPatch, ToxicRequest};

use crate::chunk::Chunk;
use crate::hangup::{Hangup, HangupState, Teardown};
use crate::link::Chain;
use crate::registry::ToxicRegistry;
use crate::stream::{ChunkReader, ChunkWriter};
use crate::toxics::ToxicSpec;

const READ_SIZE: usize = 32 * 1024;

struct Inner {
    /// Declared toxics per direction. Index 0 is the hidden head.
    chain: [Vec<ToxicSpec>; 2],
    links: HashMap<String, Chain>,
}

impl Inner {
    fn find(&self, name: &str) -> Option<(Direction, usize)> {
        Direction::ALL.into_iter().find_map(|direction| {
            self.chain[direction.index()]
                .iter()
                .skip(1)
                .position(|spec| spec.name == name)
                .map(|i| (direction, i + 1))
        })
    }

    fn links_mut(&mut self, direction: Direction) -> impl Iterator<Item = &mut Chain> {
        self.links
            .values_mut()
            .filter(move |chain| chain.direction() == direction)
    }

    async fn remove_at(&mut self, direction: Direction, index: usize) -> ToxicSpec {
        let chain = &mut self.chain[direction.index()];
        let spec = chain.remove(index);
        for (i, spec) in chain.iter_mut().enumerate().skip(index) {
            spec.index = i;
        }
        join_all(
            self.links_mut(direction)
                .map(|chain| chain.remove_toxic(index)),
        )
        .await;
        spec
    }
}

pub struct ToxicCollection {
    proxy: String,
    registry: Arc<ToxicRegistry>,
    inner: Mutex<Inner>,
}

impl ToxicCollection {
    pub fn new(proxy: impl Into<String>, registry: Arc<ToxicRegistry>) -> Self {
        Self {
            proxy: proxy.into(),
            registry,
            inner: Mutex::new(Inner {
                chain: Direction::ALL.map(|direction| vec![ToxicSpec::head(direction)]),
                links: HashMap::new(),
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// All declared toxics, upstream first, in chain order.
    pub async fn list_toxics(&self) -> Vec<ToxicSpec> {
        let inner = self.inner.lock().await;
        inner
            .chain
            .iter()
            .flat_map(|chain| chain.iter().skip(1).cloned())
            .collect()
    }

    pub async fn get_toxic(&self, name: &str) -> Result<ToxicSpec, ToxicError> {
        let inner = self.inner.lock().await;
        let (direction, index) = inner.find(name).ok_or(ToxicError::NotFound)?;
        Ok(inner.chain[direction.index()][index].clone())
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Declare a new toxic at the end of its direction's chain and splice it
    /// into every live link.
    pub async fn add_toxic(&self, request: ToxicRequest) -> Result<ToxicSpec, ToxicError> {
        let kind = self.registry.get(&request.kind)?;
        let direction = match request.stream.as_deref() {
            None | Some("") => Direction::Downstream,
            Some(stream) => stream.parse()?,
        };
        let toxicity = validate_toxicity(request.toxicity.unwrap_or(1.0))?;
        let name = match request.name {
            Some(name) if !name.is_empty() => name,
            _ => format!("{}_{}", kind.name, direction),
        };

        let mut inner = self.inner.lock().await;
        if inner.find(&name).is_some() {
            return Err(ToxicError::AlreadyExists);
        }
        let toxic = kind.build(request.attributes)?;

        let spec = ToxicSpec {
            name,
            kind: kind.name,
            direction,
            toxicity,
            index: inner.chain[direction.index()].len(),
            buffer_size: kind.buffer_size,
            toxic,
        };
        inner.chain[direction.index()].push(spec.clone());
        join_all(inner.links_mut(direction).map(|chain| chain.add_toxic(&spec))).await;

        tracing::info!(
            proxy = %self.proxy,
            toxic = %spec.name,
            kind = spec.kind,
            direction = %direction,
            toxicity,
            "toxic added"
        );
        Ok(spec)
    }

    /// Merge `patch` into a toxic's attributes and restart it on every live
    /// link. Per-connection state is kept.
    pub async fn update_toxic(
        &self,
        name: &str,
        patch: ToxicPatch,
    ) -> Result<ToxicSpec, ToxicError> {
        let mut inner = self.inner.lock().await;
        let (direction, index) = inner.find(name).ok_or(ToxicError::NotFound)?;
        let current = &inner.chain[direction.index()][index];

        let toxicity = match patch.toxicity {
            Some(toxicity) => validate_toxicity(toxicity)?,
            None => current.toxicity,
        };
        let attributes = merge_attributes(current.toxic.attributes(), patch.attributes)?;
        let toxic = self.registry.get(current.kind)?.build(attributes)?;

        let spec = ToxicSpec {
            toxicity,
            toxic,
            ..current.clone()
        };
        inner.chain[direction.index()][index] = spec.clone();
        join_all(
            inner
                .links_mut(direction)
                .map(|chain| chain.update_toxic(&spec)),
        )
        .await;

        tracing::info!(proxy = %self.proxy, toxic = %spec.name, "toxic updated");
        Ok(spec)
    }

    pub async fn remove_toxic(&self, name: &str) -> Result<(), ToxicError> {
        let mut inner = self.inner.lock().await;
        let (direction, index) = inner.find(name).ok_or(ToxicError::NotFound)?;
        let spec = inner.remove_at(direction, index).await;
        tracing::info!(proxy = %self.proxy, toxic = %spec.name, "toxic removed");
        Ok(())
    }

    /// Remove every toxic, one splice at a time.
    pub async fn reset_toxics(&self) {
        let mut inner = self.inner.lock().await;
        for direction in Direction::ALL {
            while inner.chain[direction.index()].len() > 1 {
                inner.remove_at(direction, 1).await;
            }
        }
        tracing::debug!(proxy = %self.proxy, "toxics reset");
    }

    // ── Links ────────────────────────────────────────────────────────────

    /// Start copying `source` into `destination` through the declared chain
    /// for `direction`. The returned task finishes once the destination side
    /// is done and the link has been deregistered.
    pub async fn start_link<R, W>(
        self: &Arc<Self>,
        name: impl Into<String>,
        source: R,
        destination: W,
        direction: Direction,
        hangup: Hangup,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: Teardown,
    {
        let name = name.into();
        let (input, output) = {
            let mut inner = self.inner.lock().await;
            let (chain, input, output) = Chain::start(
                name.clone(),
                direction,
                &inner.chain[direction.index()],
                hangup.clone(),
            );
            tracing::debug!(
                proxy = %self.proxy,
                link = %name,
                stages = chain.len(),
                "link started"
            );
            if inner.links.insert(name.clone(), chain).is_some() {
                tracing::warn!(proxy = %self.proxy, link = %name, "replaced a live link");
            }
            (input, output)
        };

        tokio::spawn(read_source(
            name.clone(),
            source,
            ChunkWriter::new(input),
            hangup.clone(),
        ));
        let collection = Arc::clone(self);
        tokio::spawn(async move {
            collection
                .write_destination(name, output, destination, hangup)
                .await
        })
    }

    /// Forget a finished link.
    pub async fn remove_link(&self, name: &str) {
        let removed = self.inner.lock().await.links.remove(name);
        if removed.is_none() {
            tracing::debug!(proxy = %self.proxy, link = %name, "link already gone");
        }
    }

    #[cfg(test)]
    pub(crate) async fn link_count(&self) -> usize {
        self.inner.lock().await.links.len()
    }

    async fn write_destination<W: Teardown>(
        self: Arc<Self>,
        name: String,
        mut output: mpsc::Receiver<Chunk>,
        mut destination: W,
        hangup: Hangup,
    ) {
        {
            let mut reader = ChunkReader::new(&mut output);
            tokio::select! {
                copied = tokio::io::copy(&mut reader, &mut destination) => match copied {
                    Ok(bytes) => tracing::trace!(link = %name, bytes, "link drained"),
                    Err(e) => tracing::debug!(link = %name, error = %e, "destination write failed"),
                },
                state = hangup.torn_down() => {
                    tracing::trace!(link = %name, ?state, "link torn down");
                }
            }
        }
        // A mutation holding the lock may be waiting on a stage blocked on
        // this queue.
        drop(output);

        hangup.drain();
        self.remove_link(&name).await;

        if hangup.state() == HangupState::Reset {
            destination.abort();
        } else if let Err(e) = destination.shutdown().await {
            tracing::trace!(link = %name, error = %e, "destination shutdown failed");
        }
    }
}

async fn read_source<R>(name: String, mut source: R, writer: ChunkWriter, hangup: Hangup)
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        pumped = pump(&mut source, &writer) => {
            if let Err(e) = pumped {
                tracing::debug!(link = %name, error = %e, "source read ended");
            }
        }
        state = hangup.hung_up() => {
            tracing::trace!(link = %name, ?state, "source hung up");
        }
    }
    writer.close();
}

async fn pump<R>(source: &mut R, writer: &ChunkWriter) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_SIZE];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write(&buf[..n]).await?;
    }
}

fn validate_toxicity(toxicity: f32) -> Result<f32, ToxicError> {
    if (0.0..=1.0).contains(&toxicity) {
        Ok(toxicity)
    } else {
        Err(ToxicError::InvalidToxicity(toxicity))
    }
}

/// Overlay the keys of `patch` on `current`.
fn merge_attributes(current: Value, patch: Value) -> Result<Value, ToxicError> {
    let mut merged = match current {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if !patch.is_null() {
        let patch: Map<String, Value> = serde_json::from_value(patch)?;
        merged.extend(patch);
    }
    Ok(Value::Object(merged))
}
