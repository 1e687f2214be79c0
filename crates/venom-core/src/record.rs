//! JSON records exchanged with the admin layer.
//!
//! Toxic attributes stay a flat JSON object here; they are decoded into the
//! concrete toxic's parameters only once its type has been resolved from the
//! registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::direction::Direction;

/// A toxic as listed by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToxicRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub stream: Direction,
    pub toxicity: f32,
    pub attributes: Value,
}

/// Body of a toxic creation request. Missing fields fall back to the
/// defaults applied by the collection (downstream, toxicity 1, `<type>_<stream>`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToxicRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub toxicity: Option<f32>,
    #[serde(default)]
    pub attributes: Value,
}

impl ToxicRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stream(mut self, direction: Direction) -> Self {
        self.stream = Some(direction.as_str().to_string());
        self
    }

    pub fn toxicity(mut self, toxicity: f32) -> Self {
        self.toxicity = Some(toxicity);
        self
    }

    pub fn attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Partial update of an existing toxic. Attributes are merged key by key
/// over the current ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToxicPatch {
    #[serde(default)]
    pub toxicity: Option<f32>,
    #[serde(default)]
    pub attributes: Value,
}

/// Declared proxy, as found in the config file or a creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub upstream: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProxyConfig {
    pub fn new(
        name: impl Into<String>,
        listen: impl Into<String>,
        upstream: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            listen: listen.into(),
            upstream: upstream.into(),
            enabled: true,
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:0".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Partial update of a proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyPatch {
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default)]
    pub upstream: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A proxy with its toxics, as listed by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub name: String,
    pub listen: String,
    pub upstream: String,
    pub enabled: bool,
    pub toxics: Vec<ToxicRecord>,
}
