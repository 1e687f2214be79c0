//! venomd: TCP fault-injection proxy daemon.
//!
//! Usage: `venomd [config.toml]`. Without an argument the config is resolved
//! from `$VENOM_CONFIG` or the XDG config directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use venom_core::config::VenomConfig;
use venom_services::ProxyCollection;

fn load_config() -> Result<VenomConfig> {
    if let Some(path) = std::env::args().nth(1) {
        let path = PathBuf::from(path);
        return VenomConfig::from_file(&path)
            .with_context(|| format!("failed to load {}", path.display()));
    }

    if let Err(e) = VenomConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    Ok(VenomConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        VenomConfig::default()
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config()?;
    tracing::info!(
        proxies = config.proxies.len(),
        api = %config.api.addr(),
        "venomd starting"
    );

    let proxies = Arc::new(ProxyCollection::default());
    tracing::info!(toxics = ?proxies.registry().names(), "toxics registered");

    if !config.proxies.is_empty() {
        proxies
            .populate(config.proxies.clone())
            .await
            .context("failed to create configured proxies")?;
    }

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Admin API ────────────────────────────────────────────────────────────
    let addr = config.api.addr();
    let state = venom_api::ApiState {
        proxies: Arc::clone(&proxies),
    };
    let mut api_shutdown = shutdown_tx.subscribe();
    let served = venom_api::serve(state, &addr, async move {
        let _ = api_shutdown.recv().await;
    })
    .await;

    // ── Wait for exit ────────────────────────────────────────────────────────
    proxies.clear().await;
    tracing::info!("proxies stopped");

    if let Err(e) = &served {
        tracing::error!(error = %e, "API server failed");
    }
    served
}
