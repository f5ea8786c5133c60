//! Bounded page fetching. Any failure becomes a skip reason, never an error.

use std::time::Duration;

use url::Url;

pub const USER_AGENT: &str = "SitesmithBot/1.0 (+site import)";
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024;

/// HTML body plus the URL the request ended at after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    pub final_url: Url,
}

/// Why a page was left out of the crawl.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("non-HTML content: {0}")]
    NotHtml(String),
    #[error("response too large: {0} bytes")]
    TooLarge(usize),
    #[error("fetch failed: {0}")]
    Transport(String),
}

/// GET `url` within `timeout`. The request future is dropped when the
/// deadline passes, cancelling the in-flight connection.
pub async fn fetch_page(
    client: &reqwest::Client,
    url: &Url,
    timeout: Duration,
) -> Result<FetchedPage, SkipReason> {
    match tokio::time::timeout(timeout, fetch_inner(client, url)).await {
        Ok(result) => result,
        Err(_) => Err(SkipReason::Timeout(timeout.as_secs())),
    }
}

/// Plain-text GET used for robots.txt and sitemap.xml. `None` on any failure.
pub async fn fetch_text(client: &reqwest::Client, url: &str, timeout: Duration) -> Option<String> {
    let request = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .timeout(timeout)
        .send();
    let resp = tokio::time::timeout(timeout, request).await.ok()?.ok()?;
    if !resp.status().is_success() {
        tracing::debug!(url = %url, status = resp.status().as_u16(), "auxiliary fetch failed");
        return None;
    }
    resp.text().await.ok()
}

async fn fetch_inner(client: &reqwest::Client, url: &Url) -> Result<FetchedPage, SkipReason> {
    let resp = client
        .get(url.as_str())
        .header("User-Agent", USER_AGENT)
        .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.5")
        .send()
        .await
        .map_err(|e| SkipReason::Transport(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(SkipReason::Status(status.as_u16()));
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    if !content_type.is_empty() && !content_type.contains("html") {
        return Err(SkipReason::NotHtml(content_type));
    }
    if let Some(len) = resp.content_length() {
        if len as usize > MAX_PAGE_SIZE {
            return Err(SkipReason::TooLarge(len as usize));
        }
    }

    let final_url = resp.url().clone();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| SkipReason::Transport(e.to_string()))?;
    if bytes.len() > MAX_PAGE_SIZE {
        return Err(SkipReason::TooLarge(bytes.len()));
    }

    Ok(FetchedPage {
        html: String::from_utf8_lossy(&bytes).into_owned(),
        final_url,
    })
}
