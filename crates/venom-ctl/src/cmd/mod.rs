//! CLI command modules.

pub mod http;
pub mod proxies;
pub mod toxics;
