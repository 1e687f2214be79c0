//! venom-services: the toxic pipeline runtime and the TCP proxies built on
//! it.
//!
//! Data path, per connection and direction:
//!
//! ```text
//! socket ─► ChunkWriter ─► Stage(head) ─► Stage(toxic) ... ─► ChunkReader ─► socket
//! ```
//!
//! Control path: `ProxyCollection` → `Proxy` → `ToxicCollection`, which
//! applies each toxic mutation to every live chain.

pub mod chunk;
pub mod hangup;
mod link;
pub mod proxy;
pub mod proxy_collection;
pub mod registry;
pub mod stage;
pub mod stream;
pub mod toxic_collection;
pub mod toxics;

pub use chunk::Chunk;
pub use hangup::{Hangup, HangupState, Teardown};
pub use proxy::Proxy;
pub use proxy_collection::ProxyCollection;
pub use registry::{ToxicKind, ToxicRegistry};
pub use stage::{Stage, StageEvent, ToxicState};
pub use stream::{ChunkReader, ChunkWriter};
pub use toxic_collection::ToxicCollection;
pub use toxics::{Toxic, ToxicSpec};
