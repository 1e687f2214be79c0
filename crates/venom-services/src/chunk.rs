//! Chunk: the unit of transport inside a link.

use bytes::Bytes;
use tokio::time::Instant;

/// A byte buffer stamped with the time it entered the proxy.
///
/// Payloads are `Bytes`, so slicing a chunk into pieces never copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    pub timestamp: Instant,
}

impl Chunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            timestamp: Instant::now(),
        }
    }

    /// A piece of this chunk that keeps the original timestamp.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            data: self.data.slice(range),
            timestamp: self.timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
