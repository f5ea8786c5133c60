//! URL normalization and slug derivation for crawled pages.
//!
//! `normalize_url` is the single deduplication key for link sets: two URLs
//! that differ only by query string or fragment normalize to the same value.

use url::Url;

/// Extensions that never point at an HTML page worth crawling.
pub const SKIP_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".rar", ".gz", ".7z",
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".bmp",
    ".css", ".js", ".woff", ".woff2", ".ttf",
    ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".webm",
    ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ".exe", ".dmg",
];

/// Resolve `url` against `base`, keeping it only when it shares `base`'s origin.
///
/// Fragment and query string are dropped and a single trailing slash is
/// removed from every path except the bare root.
pub fn normalize_url(url: &str, base: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    normalize_against(url, &base)
}

pub(crate) fn normalize_against(url: &str, base: &Url) -> Option<String> {
    let mut resolved = base.join(url.trim()).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    if resolved.origin() != base.origin() {
        return None;
    }
    resolved.set_fragment(None);
    resolved.set_query(None);

    let mut s = resolved.to_string();
    if s.ends_with('/') && resolved.path() != "/" {
        s.pop();
    }
    Some(s)
}

/// Map a page URL to a filesystem-safe slug (`/services/plumbing.html` →
/// `services--plumbing`, root → `index`).
pub fn url_to_slug(url: &str, base: &str) -> String {
    let path = Url::parse(base)
        .ok()
        .and_then(|b| b.join(url).ok())
        .map(|u| u.path().to_string())
        .unwrap_or_else(|| url.to_string());
    path_to_slug(&path)
}

pub(crate) fn path_to_slug(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    let trimmed = trimmed.strip_suffix(".html").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return "index".to_string();
    }
    trimmed.replace('/', "--")
}

pub(crate) fn has_skipped_extension(path: &str) -> bool {
    let lower = path.to_lowercase();
    SKIP_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}
