//! Toxic registry: the kinds of toxic a proxy can instantiate by name.
//!
//! Built once at startup from a fixed list and shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use venom_core::ToxicError;

use crate::toxics::{
    Bandwidth, Corrupt, Latency, LimitData, LimitTime, Noop, ResetPeer, Slicer, SlowClose,
    SlowOpen, Timeout, Toxic,
};

type Factory = fn(Value) -> Result<Arc<dyn Toxic>, serde_json::Error>;

/// One registered toxic type.
#[derive(Clone, Copy)]
pub struct ToxicKind {
    pub name: &'static str,
    /// Capacity of the queue feeding a stage of this kind.
    pub buffer_size: usize,
    build: Factory,
}

impl ToxicKind {
    /// A kind whose attributes decode straight into `T`.
    pub fn of<T>(name: &'static str, buffer_size: usize) -> Self
    where
        T: Toxic + DeserializeOwned + 'static,
    {
        Self {
            name,
            buffer_size,
            build: |attributes| Ok(Arc::new(serde_json::from_value::<T>(attributes)?)),
        }
    }

    /// Decode `attributes` into a new toxic. Missing fields take their
    /// defaults; `null` means no attributes.
    pub fn build(&self, attributes: Value) -> Result<Arc<dyn Toxic>, ToxicError> {
        let attributes = match attributes {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Ok((self.build)(attributes)?)
    }
}

impl std::fmt::Debug for ToxicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToxicKind")
            .field("name", &self.name)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ToxicRegistry {
    kinds: HashMap<&'static str, ToxicKind>,
}

impl ToxicRegistry {
    pub fn new(kinds: impl IntoIterator<Item = ToxicKind>) -> Self {
        Self {
            kinds: kinds.into_iter().map(|kind| (kind.name, kind)).collect(),
        }
    }

    /// Every toxic this crate ships.
    pub fn builtin() -> Self {
        Self::new([
            ToxicKind::of::<Noop>("noop", 0),
            ToxicKind::of::<Latency>("latency", 1024),
            ToxicKind::of::<Bandwidth>("bandwidth", 0),
            ToxicKind::of::<Slicer>("slicer", 0),
            ToxicKind::of::<LimitData>("limit_data", 0),
            ToxicKind::of::<LimitTime>("limit_time", 0),
            ToxicKind::of::<Timeout>("timeout", 0),
            ToxicKind::of::<ResetPeer>("reset_peer", 0),
            ToxicKind::of::<SlowClose>("slow_close", 0),
            ToxicKind::of::<SlowOpen>("slow_open", 1024),
            ToxicKind::of::<Corrupt>("corrupt", 0),
        ])
    }

    pub fn get(&self, name: &str) -> Result<&ToxicKind, ToxicError> {
        self.kinds
            .get(name)
            .ok_or_else(|| ToxicError::InvalidType(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.kinds.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToxicRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
