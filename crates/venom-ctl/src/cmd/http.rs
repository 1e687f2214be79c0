//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

/// Send `req`, turning an error reply into an `Err` carrying the server's message.
async fn send(req: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
    let resp = req
        .send()
        .await
        .with_context(|| format!("failed to connect to venomd at {}; is it running?", url))?;
    if resp.status().is_success() {
        return Ok(resp);
    }

    let code = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => bail!("{} ({})", body.error, body.status),
        Err(_) => bail!("request failed with {}", code),
    }
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    send(reqwest::Client::new().get(url), url)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    send(reqwest::Client::new().post(url).json(body), url)
        .await?
        .json::<R>()
        .await
        .context("failed to parse response")
}

/// POST without a body, for endpoints that reply 204.
pub async fn post_empty(url: &str) -> Result<()> {
    send(reqwest::Client::new().post(url), url).await?;
    Ok(())
}

pub async fn delete(url: &str) -> Result<()> {
    send(reqwest::Client::new().delete(url), url).await?;
    Ok(())
}
