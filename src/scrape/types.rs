use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Per-page record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDescriptor {
    pub action: Option<String>,
    pub method: String,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavLink {
    pub text: String,
    pub href: String,
}

/// Everything extracted from one fetched page.
///
/// Built once by [`extract_page_data`](super::extract_page_data). The only
/// later change is attaching the storage path of its HTML snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    pub url: String,
    pub slug: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub og_tags: BTreeMap<String, String>,
    pub canonical: Option<String>,
    pub structured_data: Vec<Value>,
    pub headings: Vec<Heading>,
    pub body_text: String,
    pub images: Vec<ImageRef>,
    pub internal_links: Vec<String>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub address: Option<String>,
    pub social_links: Vec<String>,
    pub testimonials: Vec<String>,
    pub forms: Vec<FormDescriptor>,
    pub navigation: Vec<NavLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
}

impl PageData {
    pub fn with_snapshot(mut self, path: impl Into<String>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Whole-site crawl
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanonicalPrefix {
    Www,
    NonWww,
}

impl CanonicalPrefix {
    pub fn from_host(host: &str) -> Self {
        if host.starts_with("www.") {
            CanonicalPrefix::Www
        } else {
            CanonicalPrefix::NonWww
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: String,
}

/// Site-wide contact details folded together from every scraped page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalData {
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub address: Option<String>,
    pub social_links: Vec<String>,
    pub navigation: Vec<NavLink>,
}

/// Aggregate of a crawl assembled across several requests by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedData {
    pub crawled_at: DateTime<Utc>,
    pub source_url: String,
    pub canonical_prefix: CanonicalPrefix,
    pub ssl: bool,
    pub sitemap_urls: Vec<String>,
    pub robots_disallow: Vec<String>,
    pub global: GlobalData,
    pub pages: Vec<PageData>,
    pub skipped: Vec<SkippedUrl>,
}

impl ScrapedData {
    pub fn new(source_url: impl Into<String>, canonical_prefix: CanonicalPrefix, ssl: bool) -> Self {
        Self {
            crawled_at: Utc::now(),
            source_url: source_url.into(),
            canonical_prefix,
            ssl,
            sitemap_urls: Vec::new(),
            robots_disallow: Vec::new(),
            global: GlobalData::default(),
            pages: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Fold a page's contact details into the global aggregate and append it.
    /// Navigation is taken from the first page that has any.
    pub fn absorb_page(&mut self, page: PageData) {
        merge_unique(&mut self.global.phones, &page.phones);
        merge_unique(&mut self.global.emails, &page.emails);
        merge_unique(&mut self.global.social_links, &page.social_links);
        if self.global.address.is_none() {
            self.global.address = page.address.clone();
        }
        if self.global.navigation.is_empty() {
            self.global.navigation = page.navigation.clone();
        }
        self.pages.push(page);
    }

    pub fn skip(&mut self, url: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedUrl { url: url.into(), reason: reason.into() });
    }
}

fn merge_unique(into: &mut Vec<String>, from: &[String]) {
    let mut seen: HashSet<String> = into.iter().cloned().collect();
    for item in from {
        if seen.insert(item.clone()) {
            into.push(item.clone());
        }
    }
}
