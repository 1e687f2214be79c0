//! Daemon configuration.
//!
//! Values come from, in increasing priority: built-in defaults, the TOML
//! file, then `VENOM_*` environment variables. The file is looked up at
//! `$VENOM_CONFIG`, else `$XDG_CONFIG_HOME/venom/config.toml`, else
//! `~/.config/venom/config.toml`.
//!
//! ```toml
//! [api]
//! host = "127.0.0.1"
//! port = 8474
//!
//! [[proxies]]
//! name = "redis"
//! listen = "127.0.0.1:26379"
//! upstream = "127.0.0.1:6379"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::ProxyConfig;

const FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenomConfig {
    /// Admin API listener.
    pub api: ApiConfig,
    /// Proxies created (and started, when enabled) at daemon startup.
    pub proxies: Vec<ProxyConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8474,
        }
    }
}

impl ApiConfig {
    /// `host:port`, ready to bind.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("cannot write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot encode default config: {0}")]
    Encode(#[from] toml::ser::Error),
}

impl VenomConfig {
    /// Defaults, overlaid with the config file if there is one, overlaid
    /// with the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = match path.try_exists() {
            Ok(true) => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse one file; no environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn file_path() -> PathBuf {
        if let Some(explicit) = std::env::var_os("VENOM_CONFIG") {
            return PathBuf::from(explicit);
        }
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| Path::new(&home).join(".config")))
            .unwrap_or_else(std::env::temp_dir);
        base.join("venom").join(FILE_NAME)
    }

    /// Create the config file with default contents unless it already
    /// exists. Returns its path either way.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if path.exists() {
            return Ok(path);
        }

        let write_error = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(write_error)?;
        }
        let text = toml::to_string_pretty(&Self::default())?;
        std::fs::write(&path, text).map_err(write_error)?;
        Ok(path)
    }

    /// `VENOM_API__HOST` and `VENOM_API__PORT`. Unparsable values are
    /// ignored.
    fn apply_env(&mut self) {
        override_from_env("VENOM_API__HOST", &mut self.api.host);
        override_from_env("VENOM_API__PORT", &mut self.api.port);
    }
}

fn override_from_env<T: FromStr>(key: &str, slot: &mut T) {
    if let Some(value) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
        *slot = value;
    }
}
