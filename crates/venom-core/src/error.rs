//! Typed errors surfaced by the pipeline and proxy layers.
//!
//! The admin layer owns the translation into transport responses; see
//! `status_code()` for the HTTP mapping it uses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToxicError {
    #[error("toxic not found")]
    NotFound,
    #[error("toxic already exists")]
    AlreadyExists,
    #[error("invalid toxic type: {0}")]
    InvalidType(String),
    #[error("stream was invalid, can be either upstream or downstream (got {0:?})")]
    InvalidDirection(String),
    #[error("toxicity must be within [0, 1] (got {0})")]
    InvalidToxicity(f32),
    #[error("bad toxic attributes: {0}")]
    BadAttributes(#[from] serde_json::Error),
}

impl ToxicError {
    pub fn status_code(&self) -> u16 {
        match self {
            ToxicError::NotFound => 404,
            ToxicError::AlreadyExists => 409,
            ToxicError::InvalidType(_)
            | ToxicError::InvalidDirection(_)
            | ToxicError::InvalidToxicity(_)
            | ToxicError::BadAttributes(_) => 400,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy not found")]
    NotFound,
    #[error("proxy already exists")]
    AlreadyExists,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("failed to listen on {0}: {1}")]
    Bind(String, std::io::Error),
    #[error(transparent)]
    Toxic(#[from] ToxicError),
}

impl ProxyError {
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::NotFound => 404,
            ProxyError::AlreadyExists => 409,
            ProxyError::MissingField(_) => 400,
            ProxyError::Bind(..) => 500,
            ProxyError::Toxic(e) => e.status_code(),
        }
    }
}
