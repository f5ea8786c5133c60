//! Site discovery: homepage, robots.txt and sitemap in one pass, producing
//! the crawl seed the caller then scrapes page by page.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use super::extract::extract_page_data;
use super::fetch::{fetch_page, fetch_text, SkipReason};
use super::robots::{is_blocked_by_robots, parse_robots_txt, parse_sitemap_xml};
use super::types::{CanonicalPrefix, ScrapedData};
use super::urls::normalize_against;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub origin: String,
    /// Seed aggregate: homepage absorbed, robots/sitemap recorded.
    pub site: ScrapedData,
    /// Same-origin URLs still to scrape, in discovery order.
    pub queue: Vec<String>,
}

pub async fn discover_site(
    client: &reqwest::Client,
    start: &Url,
    timeout: Duration,
    max_pages: usize,
) -> Result<Discovery, SkipReason> {
    let home = fetch_page(client, start, timeout).await?;
    let final_url = home.final_url;
    let origin = final_url
        .join("/")
        .map_err(|e| SkipReason::Transport(e.to_string()))?;
    let origin_str = origin.to_string();

    let robots_url = format!("{}robots.txt", origin_str);
    let sitemap_url = format!("{}sitemap.xml", origin_str);
    let (robots_txt, sitemap_xml) = tokio::join!(
        fetch_text(client, &robots_url, timeout),
        fetch_text(client, &sitemap_url, timeout),
    );

    let disallow = robots_txt.as_deref().map(parse_robots_txt).unwrap_or_default();
    let sitemap_urls = sitemap_xml
        .as_deref()
        .map(|xml| parse_sitemap_xml(xml, &origin_str))
        .unwrap_or_default();

    let host = final_url.host_str().unwrap_or("");
    let mut site = ScrapedData::new(
        start.to_string(),
        CanonicalPrefix::from_host(host),
        final_url.scheme() == "https",
    );
    site.sitemap_urls = sitemap_urls.clone();
    site.robots_disallow = disallow.clone();

    let homepage = extract_page_data(&home.html, &final_url, &origin);
    let candidates: Vec<String> = sitemap_urls
        .iter()
        .chain(homepage.internal_links.iter())
        .cloned()
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    if let Some(home_key) = normalize_against(final_url.as_str(), &origin) {
        seen.insert(home_key);
    }

    let mut queue = Vec::new();
    for candidate in candidates {
        if !seen.insert(candidate.clone()) {
            continue;
        }
        let path = Url::parse(&candidate).map(|u| u.path().to_string()).unwrap_or_default();
        if is_blocked_by_robots(&path, &disallow) {
            site.skip(candidate, "blocked by robots.txt");
        } else if queue.len() >= max_pages {
            site.skip(candidate, "page limit reached");
        } else {
            queue.push(candidate);
        }
    }

    tracing::info!(
        origin = %origin_str,
        queued = queue.len(),
        skipped = site.skipped.len(),
        sitemap = site.sitemap_urls.len(),
        "site discovery complete"
    );

    site.absorb_page(homepage);
    Ok(Discovery { origin: origin_str, site, queue })
}
