//! Shared HTTP plumbing: one retrying GET helper with exponential backoff,
//! plus thin wrappers for the content types the scrapers request.

use crate::error::Result;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::warn;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml";
const RSS_ACCEPT: &str = "application/rss+xml,text/xml";

const DEFAULT_RETRIES: u32 = 5;
const BASE_DELAY_MS: u64 = 2_000;

async fn http_get(client: &Client, url: &str, accept: Option<&str>) -> Result<Response> {
    let mut last_error = None;
    for attempt in 0..DEFAULT_RETRIES {
        let mut request = client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        match request.send().await.and_then(|resp| resp.error_for_status()) {
            Ok(response) => return Ok(response),
            Err(err) => {
                if attempt + 1 == DEFAULT_RETRIES {
                    return Err(err.into());
                }
                let backoff = BASE_DELAY_MS * 2u64.pow(attempt);
                warn!("GET {url} failed ({err}), retrying in {backoff} ms");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                last_error = Some(err);
            }
        }
    }
    // Unreachable: the final attempt either returned or propagated above.
    Err(last_error.expect("retry loop ran at least once").into())
}

pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    Ok(http_get(client, url, None).await?.text().await?)
}

pub async fn fetch_html(client: &Client, url: &str) -> Result<String> {
    Ok(http_get(client, url, Some(HTML_ACCEPT)).await?.text().await?)
}

pub async fn fetch_rss(client: &Client, url: &str) -> Result<String> {
    Ok(http_get(client, url, Some(RSS_ACCEPT)).await?.text().await?)
}

pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    Ok(http_get(client, url, None).await?.bytes().await?.to_vec())
}

/// Roster exports are served as Latin-1; decode bytes accordingly instead of
/// trusting the response charset.
pub async fn fetch_latin1(client: &Client, url: &str) -> Result<String> {
    let bytes = fetch_bytes(client, url).await?;
    Ok(bytes.iter().map(|&b| b as char).collect())
}
