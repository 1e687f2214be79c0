//! venom-core: shared types, typed errors, API records and configuration.
//! All other venom crates depend on this one.

pub mod config;
pub mod direction;
pub mod error;
pub mod record;

pub use direction::Direction;
pub use error::{ProxyError, ToxicError};
pub use record::{ProxyConfig, ProxyPatch, ProxyRecord, ToxicPatch, ToxicRecord, ToxicRequest};
