//! Proxy management commands.

use std::collections::BTreeMap;

use anyhow::Result;

use venom_core::{ProxyConfig, ProxyPatch, ProxyRecord};

use super::http::{base_url, delete, get_json, post_empty, post_json_body};

pub async fn cmd_list(port: u16) -> Result<()> {
    let proxies: BTreeMap<String, ProxyRecord> =
        get_json(&format!("{}/proxies", base_url(port))).await?;

    if proxies.is_empty() {
        println!("No proxies configured.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Proxies ({})", proxies.len());
    println!("═══════════════════════════════════════");

    for p in proxies.values() {
        let icon = if p.enabled { "●" } else { "○" };
        println!(
            "  {} {:<16} {} → {}  ({} toxics)",
            icon,
            p.name,
            p.listen,
            p.upstream,
            p.toxics.len()
        );
    }

    Ok(())
}

pub async fn cmd_inspect(port: u16, name: &str) -> Result<()> {
    let p: ProxyRecord = get_json(&format!("{}/proxies/{}", base_url(port), name)).await?;

    println!("═══════════════════════════════════════");
    println!("  Proxy {}", p.name);
    println!("═══════════════════════════════════════");
    println!("  listen   : {}", p.listen);
    println!("  upstream : {}", p.upstream);
    println!("  enabled  : {}", p.enabled);

    if p.toxics.is_empty() {
        println!("\n  No toxics.");
        return Ok(());
    }

    println!("\n  Toxics:");
    for t in &p.toxics {
        println!("  ┌─ {}", t.name);
        println!("  │  type       : {}", t.kind);
        println!("  │  stream     : {}", t.stream);
        println!("  │  toxicity   : {}", t.toxicity);
        println!("  └─ attributes : {}", t.attributes);
    }

    Ok(())
}

pub async fn cmd_create(port: u16, name: &str, listen: &str, upstream: &str) -> Result<()> {
    let config = ProxyConfig::new(name, listen, upstream);
    let p: ProxyRecord = post_json_body(&format!("{}/proxies", base_url(port)), &config).await?;
    println!("Created proxy {} listening on {} → {}", p.name, p.listen, p.upstream);
    Ok(())
}

pub async fn cmd_delete(port: u16, name: &str) -> Result<()> {
    delete(&format!("{}/proxies/{}", base_url(port), name)).await?;
    println!("Deleted proxy {}.", name);
    Ok(())
}

pub async fn cmd_toggle(port: u16, name: &str) -> Result<()> {
    let url = format!("{}/proxies/{}", base_url(port), name);
    let current: ProxyRecord = get_json(&url).await?;
    let patch = ProxyPatch {
        enabled: Some(!current.enabled),
        ..ProxyPatch::default()
    };
    let p: ProxyRecord = post_json_body(&url, &patch).await?;
    println!(
        "Proxy {} is now {}.",
        p.name,
        if p.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub async fn cmd_reset(port: u16) -> Result<()> {
    post_empty(&format!("{}/reset", base_url(port))).await?;
    println!("All proxies enabled and toxics removed.");
    Ok(())
}
