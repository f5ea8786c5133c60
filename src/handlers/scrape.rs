use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

use super::{load_client, required, save_client_progress, ApiError};
use crate::identity::AuthUser;
use crate::models::ClientStatus;
use crate::scrape::{discover_site, extract_page_data, fetch_page, SkippedUrl};
use crate::state::AppState;

const DEFAULT_MAX_PAGES: usize = 25;
const MAX_PAGES_CAP: usize = 100;

fn parse_http_url(raw: &str, field: &str) -> Result<Url, ApiError> {
    let with_scheme = if raw.contains("://") { raw.to_string() } else { format!("https://{}", raw) };
    let url = Url::parse(&with_scheme)
        .map_err(|e| ApiError::BadRequest(format!("'{}' is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ApiError::BadRequest(format!("'{}' must be an http(s) URL", field))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    pub url: Option<String>,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

/// POST /api/scrape/discover: homepage, robots.txt, sitemap and the queue
/// of pages still to scrape.
pub async fn scrape_discover(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<DiscoverRequest>,
) -> Result<Json<Value>, ApiError> {
    let start = parse_http_url(required(body.url.as_deref(), "url")?, "url")?;
    let max_pages = body.max_pages.unwrap_or(DEFAULT_MAX_PAGES).clamp(1, MAX_PAGES_CAP);

    let client = match body.client_id {
        Some(id) => Some(load_client(&state, &user, id).await?),
        None => None,
    };

    let discovery = discover_site(&state.client, &start, state.config.fetch_timeout, max_pages)
        .await
        .map_err(|reason| ApiError::Upstream(format!("could not fetch {}: {}", start, reason)))?;

    if let Some(client) = client {
        let summary = json!({
            "scrape": {
                "sourceUrl": discovery.site.source_url,
                "origin": discovery.origin,
                "crawledAt": discovery.site.crawled_at,
                "queued": discovery.queue.len(),
            }
        });
        save_client_progress(&state, &user, client.id, &summary, ClientStatus::Scraped).await;
    }

    tracing::info!(
        origin = %discovery.origin,
        queued = discovery.queue.len(),
        skipped = discovery.site.skipped.len(),
        "site discovered"
    );

    Ok(Json(json!({ "success": true, "discovery": discovery })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapePageRequest {
    pub url: Option<String>,
    /// Site origin for same-origin link filtering; defaults to the page's.
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub client_slug: Option<String>,
    #[serde(default)]
    pub snapshot: bool,
}

/// POST /api/scrape/page: fetch and extract one page. A page that cannot
/// be fetched comes back as `skipped`, not as an error.
pub async fn scrape_page(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ScrapePageRequest>,
) -> Result<Json<Value>, ApiError> {
    let url = parse_http_url(required(body.url.as_deref(), "url")?, "url")?;

    let client_slug = match (body.client_id, body.client_slug.as_deref()) {
        (Some(id), _) => Some(load_client(&state, &user, id).await?.slug),
        (None, Some(slug)) if !slug.trim().is_empty() => Some(slug.trim().to_string()),
        _ => None,
    };

    let fetched = match fetch_page(&state.client, &url, state.config.fetch_timeout).await {
        Ok(page) => page,
        Err(reason) => {
            tracing::info!(url = %url, reason = %reason, "page skipped");
            let skipped = SkippedUrl { url: url.to_string(), reason: reason.to_string() };
            return Ok(Json(json!({ "success": true, "skipped": skipped })));
        }
    };

    let origin = match body.origin.as_deref().filter(|o| !o.trim().is_empty()) {
        Some(raw) => parse_http_url(raw, "origin")?,
        None => fetched
            .final_url
            .join("/")
            .map_err(|e| ApiError::BadRequest(format!("cannot derive origin: {}", e)))?,
    };

    let mut page = extract_page_data(&fetched.html, &fetched.final_url, &origin);

    if body.snapshot {
        match client_slug.as_deref() {
            Some(slug) => match state.storage.upload(slug, &page.slug, &fetched.html).await {
                Ok(path) => page = page.with_snapshot(path),
                Err(e) => tracing::warn!(url = %url, "snapshot upload failed: {}", e),
            },
            None => tracing::warn!(url = %url, "snapshot requested without a client; skipped"),
        }
    }

    tracing::info!(
        url = %page.url,
        headings = page.headings.len(),
        links = page.internal_links.len(),
        "page scraped"
    );

    Ok(Json(json!({ "success": true, "page": page })))
}
