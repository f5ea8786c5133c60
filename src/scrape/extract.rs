//! Page extractor: raw HTML + resolved URL → [`PageData`].
//!
//! Pure and total over any input string. The only recoverable failure,
//! a JSON-LD block that does not parse, skips that block and nothing else.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use super::types::{FormDescriptor, FormField, Heading, ImageRef, NavLink, PageData};
use super::urls::{has_skipped_extension, normalize_against, path_to_slug};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MIN_BODY_CHARS: usize = 10;
const MIN_TESTIMONIAL_CHARS: usize = 20;
const MAX_TESTIMONIAL_CHARS: usize = 2000;

const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com", "instagram.com", "twitter.com", "x.com", "linkedin.com",
    "youtube.com", "tiktok.com", "pinterest.com", "yelp.com", "nextdoor.com",
];

const IMAGE_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static META_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="description"]"#));
static OG_META: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property^="og:"]"#));
static CANONICAL: LazyLock<Selector> = LazyLock::new(|| selector(r#"link[rel="canonical"]"#));
static JSON_LD: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"script[type="application/ld+json"]"#));
static HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3"));
static BODY_BLOCKS: LazyLock<Selector> = LazyLock::new(|| selector("p, li, blockquote"));
static IMAGES: LazyLock<Selector> = LazyLock::new(|| selector("img[src]"));
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static ADDRESS: LazyLock<Selector> = LazyLock::new(|| selector("address"));
static CLASSED: LazyLock<Selector> = LazyLock::new(|| selector("[class]"));
static BLOCKQUOTE: LazyLock<Selector> = LazyLock::new(|| selector("blockquote"));
static FORMS: LazyLock<Selector> = LazyLock::new(|| selector("form"));
static FORM_FIELDS: LazyLock<Selector> = LazyLock::new(|| selector("input, textarea, select"));
static NAV_LINKS: LazyLock<Selector> = LazyLock::new(|| selector("nav a[href], header a[href]"));

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)|\d{3})[\s.-]?\d{3}[\s.-]\d{4}")
        .expect("phone regex is valid")
});
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex is valid")
});

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Extract a [`PageData`] record from `html`.
///
/// `page_url` is the final URL after redirects (relative references resolve
/// against it); `origin` is the site root used for same-origin filtering.
pub fn extract_page_data(html: &str, page_url: &Url, origin: &Url) -> PageData {
    let doc = Html::parse_document(html);
    let structured_data = structured_data(&doc);

    let address = structured_data
        .iter()
        .find_map(find_postal_address)
        .or_else(|| first_text(&doc, &ADDRESS));

    PageData {
        url: page_url.to_string(),
        slug: path_to_slug(page_url.path()),
        title: first_text(&doc, &TITLE),
        meta_description: first_attr(&doc, &META_DESCRIPTION, "content"),
        og_tags: og_tags(&doc),
        canonical: first_attr(&doc, &CANONICAL, "href"),
        structured_data,
        headings: headings(&doc),
        body_text: body_text(&doc),
        images: images(&doc, page_url),
        internal_links: internal_links(&doc, page_url, origin),
        phones: phones(html),
        emails: emails(html),
        address,
        social_links: social_links(&doc, page_url),
        testimonials: testimonials(&doc),
        forms: forms(&doc, page_url),
        navigation: navigation(&doc, page_url),
        snapshot_path: None,
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

fn collapsed_text(el: ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty())
}

fn first_attr(doc: &Html, sel: &Selector, attr: &str) -> Option<String> {
    doc.select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, item: String) {
    if seen.insert(item.clone()) {
        out.push(item);
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

fn og_tags(doc: &Html) -> BTreeMap<String, String> {
    doc.select(&OG_META)
        .filter_map(|el| {
            let property = el.value().attr("property")?;
            let content = el.value().attr("content")?;
            Some((property.to_string(), content.trim().to_string()))
        })
        .collect()
}

fn structured_data(doc: &Html) -> Vec<Value> {
    doc.select(&JSON_LD)
        .filter_map(|el| {
            let raw: String = el.text().collect();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::debug!("skipping malformed JSON-LD block: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Depth-first search for the first `PostalAddress` node. `address` keys are
/// searched before sibling keys.
pub(crate) fn find_postal_address(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(find_postal_address),
        Value::Object(map) => {
            if is_postal_address(map) {
                if let Some(formatted) = format_postal_address(map) {
                    return Some(formatted);
                }
            }
            if let Some(found) = map.get("address").and_then(find_postal_address) {
                return Some(found);
            }
            map.iter()
                .filter(|(k, _)| k.as_str() != "address")
                .find_map(|(_, v)| find_postal_address(v))
        }
        _ => None,
    }
}

fn is_postal_address(map: &Map<String, Value>) -> bool {
    match map.get("@type") {
        Some(Value::String(t)) => t == "PostalAddress",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("PostalAddress")),
        _ => false,
    }
}

fn format_postal_address(map: &Map<String, Value>) -> Option<String> {
    let field = |key: &str| -> Option<String> {
        let value = match map.get(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(o) => o.get("name").and_then(Value::as_str).map(|s| s.trim().to_string()),
            _ => None,
        };
        value.filter(|s| !s.is_empty())
    };

    let region_postal = [field("addressRegion"), field("postalCode")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let parts: Vec<String> = [
        field("streetAddress"),
        field("addressLocality"),
        Some(region_postal).filter(|s| !s.is_empty()),
        field("addressCountry"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() { None } else { Some(parts.join(", ")) }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

fn headings(doc: &Html) -> Vec<Heading> {
    doc.select(&HEADINGS)
        .filter_map(|el| {
            let text = collapsed_text(el);
            if text.is_empty() {
                return None;
            }
            let level = el.value().name()[1..].parse().unwrap_or(1);
            Some(Heading { level, text })
        })
        .collect()
}

fn body_text(doc: &Html) -> String {
    doc.select(&BODY_BLOCKS)
        .map(collapsed_text)
        .filter(|t| t.chars().count() > MIN_BODY_CHARS)
        .collect::<Vec<_>>()
        .join("\n")
}

fn images(doc: &Html, page_url: &Url) -> Vec<ImageRef> {
    doc.select(&IMAGES)
        .filter_map(|el| {
            let src = el.value().attr("src")?.trim();
            if src.is_empty() || src.starts_with("data:") {
                return None;
            }
            let absolute = page_url.join(src).ok()?;
            let filename = absolute
                .path_segments()
                .and_then(|mut segs| segs.next_back())
                .unwrap_or("")
                .to_string();
            Some(ImageRef {
                src: absolute.to_string(),
                alt: el.value().attr("alt").unwrap_or("").trim().to_string(),
                filename,
            })
        })
        .collect()
}

fn is_non_page_href(href: &str) -> bool {
    let lower = href.to_lowercase();
    href.starts_with('#')
        || lower.starts_with("tel:")
        || lower.starts_with("mailto:")
        || lower.starts_with("javascript:")
}

fn internal_links(doc: &Html, page_url: &Url, origin: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for el in doc.select(&ANCHORS) {
        let Some(href) = el.value().attr("href").map(str::trim) else { continue };
        if href.is_empty() || is_non_page_href(href) {
            continue;
        }
        let Ok(absolute) = page_url.join(href) else { continue };
        if has_skipped_extension(absolute.path()) {
            continue;
        }
        if let Some(normalized) = normalize_against(absolute.as_str(), origin) {
            push_unique(&mut out, &mut seen, normalized);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Contact details
// ---------------------------------------------------------------------------

fn phones(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in PHONE_RE.find_iter(html) {
        let before = html[..m.start()].chars().next_back();
        let after = html[m.end()..].chars().next();
        if before.is_some_and(|c| c.is_ascii_digit()) || after.is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        push_unique(&mut out, &mut seen, m.as_str().trim().to_string());
    }
    out
}

fn emails(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in EMAIL_RE.find_iter(html) {
        let email = m.as_str().to_lowercase();
        if IMAGE_SUFFIXES.iter().any(|ext| email.ends_with(ext)) {
            continue;
        }
        push_unique(&mut out, &mut seen, email);
    }
    out
}

fn social_links(doc: &Html, page_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for el in doc.select(&ANCHORS) {
        let Some(href) = el.value().attr("href") else { continue };
        let Ok(absolute) = page_url.join(href.trim()) else { continue };
        let Some(host) = absolute.host_str() else { continue };
        let host = host.to_lowercase();
        let is_social = SOCIAL_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)));
        if is_social {
            push_unique(&mut out, &mut seen, absolute.to_string());
        }
    }
    out
}

fn testimonials(doc: &Html) -> Vec<String> {
    let in_window = |t: &String| {
        let n = t.chars().count();
        n > MIN_TESTIMONIAL_CHARS && n < MAX_TESTIMONIAL_CHARS
    };

    let by_class = doc.select(&CLASSED).filter(|el| {
        el.value().attr("class").is_some_and(|c| {
            let c = c.to_lowercase();
            c.contains("testimonial") || c.contains("review")
        })
    });
    let quotes = doc.select(&BLOCKQUOTE);

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for text in by_class.chain(quotes).map(collapsed_text).filter(in_window) {
        push_unique(&mut out, &mut seen, text);
    }
    out
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

fn forms(doc: &Html, page_url: &Url) -> Vec<FormDescriptor> {
    doc.select(&FORMS)
        .filter_map(|form| {
            let fields: Vec<FormField> = form
                .select(&FORM_FIELDS)
                .map(|field| {
                    let tag = field.value().name();
                    let field_type = if tag == "input" {
                        field.value().attr("type").unwrap_or("text").to_lowercase()
                    } else {
                        tag.to_string()
                    };
                    FormField {
                        name: field.value().attr("name").unwrap_or("").to_string(),
                        field_type,
                        placeholder: field.value().attr("placeholder").map(str::to_string),
                    }
                })
                .collect();
            if fields.is_empty() {
                return None;
            }
            let action = form
                .value()
                .attr("action")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(|a| page_url.join(a).map(|u| u.to_string()).unwrap_or_else(|_| a.to_string()));
            let method = form.value().attr("method").unwrap_or("get").to_uppercase();
            Some(FormDescriptor { action, method, fields })
        })
        .collect()
}

fn navigation(doc: &Html, page_url: &Url) -> Vec<NavLink> {
    doc.select(&NAV_LINKS)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            let lower = href.to_lowercase();
            if href.is_empty() || href.starts_with('#') || lower.starts_with("tel:") || lower.starts_with("mailto:") {
                return None;
            }
            let text = collapsed_text(el);
            if text.is_empty() {
                return None;
            }
            let href = page_url.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string());
            Some(NavLink { text, href })
        })
        .collect()
}
