//! Content discovery: fetch, extract, normalize.
//!
//! Provides robots.txt/sitemap parsing, URL normalization, bounded page
//! fetching and the structured page extractor used by the scrape handlers.

pub mod discover;
pub mod extract;
pub mod fetch;
pub mod robots;
pub mod types;
pub mod urls;

pub use discover::{discover_site, Discovery};
pub use extract::extract_page_data;
pub use fetch::{fetch_page, FetchedPage, SkipReason};
pub use robots::{is_blocked_by_robots, parse_robots_txt, parse_sitemap_xml};
pub use types::{
    CanonicalPrefix, FormDescriptor, FormField, GlobalData, Heading, ImageRef, NavLink, PageData,
    ScrapedData, SkippedUrl,
};
pub use urls::{normalize_url, url_to_slug};
