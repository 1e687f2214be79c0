//! Toxics: pluggable transformations applied to one direction of a link.
//!
//! ```text
//!              Toxic
//!                v
//! Client <-> [ Stage ] <-> Upstream
//! ```
//!
//! A toxic only holds its settings and the `pipe` loop. Everything that
//! belongs to one connection (queues, interrupt channel, state) lives on the
//! `Stage`, so one toxic value is shared by every live link.

mod bandwidth;
mod corrupt;
mod latency;
mod limit_data;
mod limit_time;
mod noop;
mod reset_peer;
mod slicer;
mod slow_close;
mod slow_open;
mod timeout;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use venom_core::{Direction, ToxicRecord};

use crate::stage::{Stage, ToxicState};

pub use bandwidth::Bandwidth;
pub use corrupt::Corrupt;
pub use latency::Latency;
pub use limit_data::{LimitData, LimitDataState};
pub use limit_time::{LimitTime, LimitTimeState};
pub use noop::Noop;
pub use reset_peer::ResetPeer;
pub use slicer::Slicer;
pub use slow_close::SlowClose;
pub use slow_open::{SlowOpen, SlowOpenState};
pub use timeout::Timeout;

#[async_trait]
pub trait Toxic: Attributes + fmt::Debug + Send + Sync {
    /// Move chunks from the stage's input to its output until interrupted
    /// (return, leave the stage open) or the input ends (close, return).
    async fn pipe(&self, stage: &mut Stage);

    /// Per-attachment state, created once when the toxic is attached to a
    /// link and kept across interrupts and updates.
    fn new_state(&self) -> Option<ToxicState> {
        None
    }

    /// Called once, with the stage interrupted, before the toxic is removed
    /// from a link.
    fn cleanup(&self, _stage: &mut Stage) {}
}

/// The toxic's parameters as a flat JSON object.
pub trait Attributes {
    fn attributes(&self) -> Value;
}

impl<T: Serialize> Attributes for T {
    fn attributes(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A toxic attached to a proxy: what the collection stores per position and
/// what every link of that direction runs at the same position.
#[derive(Clone)]
pub struct ToxicSpec {
    pub name: String,
    pub kind: &'static str,
    pub direction: Direction,
    pub toxicity: f32,
    /// Position in the direction's chain. 0 is the hidden head.
    pub index: usize,
    /// Capacity of the queue feeding this toxic's stage.
    pub buffer_size: usize,
    pub toxic: Arc<dyn Toxic>,
}

impl ToxicSpec {
    /// The pass-through stage every chain starts with. It gives the first
    /// real toxic an upstream neighbour to interrupt.
    pub(crate) fn head(direction: Direction) -> Self {
        Self {
            name: String::new(),
            kind: "noop",
            direction,
            toxicity: 1.0,
            index: 0,
            buffer_size: 0,
            toxic: Arc::new(Noop::default()),
        }
    }

    pub fn record(&self) -> ToxicRecord {
        ToxicRecord {
            name: self.name.clone(),
            kind: self.kind.to_string(),
            stream: self.direction,
            toxicity: self.toxicity,
            attributes: self.toxic.attributes(),
        }
    }
}

impl fmt::Debug for ToxicSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToxicSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .field("toxicity", &self.toxicity)
            .field("index", &self.index)
            .field("toxic", &self.toxic)
            .finish()
    }
}
