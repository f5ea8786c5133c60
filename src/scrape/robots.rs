//! robots.txt and sitemap.xml parsing.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::urls::normalize_against;

/// Agent token this crawler answers to in robots.txt groups.
pub const CRAWLER_AGENT: &str = "sitesmithbot";

static URL_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<url>(.*?)</url>").expect("url block regex is valid"));
static LOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>").expect("loc regex is valid"));

/// Collect the `Disallow` prefixes that apply to this crawler.
///
/// Groups addressed to `*` or to [`CRAWLER_AGENT`] are relevant. Consecutive
/// `User-agent` lines form one group; a rule line closes the agent list so
/// the next `User-agent` starts a fresh group.
pub fn parse_robots_txt(text: &str) -> Vec<String> {
    let mut rules = Vec::new();
    let mut relevant = false;
    let mut collecting_agents = false;

    for raw in text.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                let agent = value.to_lowercase();
                let matches = agent == "*" || agent.contains(CRAWLER_AGENT);
                if collecting_agents {
                    relevant |= matches;
                } else {
                    relevant = matches;
                    collecting_agents = true;
                }
            }
            "disallow" => {
                collecting_agents = false;
                if relevant && !value.is_empty() {
                    rules.push(value.to_string());
                }
            }
            _ => collecting_agents = false,
        }
    }
    rules
}

/// A path is blocked when any rule is a literal prefix of it.
pub fn is_blocked_by_robots(path: &str, rules: &[String]) -> bool {
    rules.iter().any(|rule| !rule.is_empty() && path.starts_with(rule.as_str()))
}

/// Pull `<url><loc>` entries out of a sitemap, normalized against `origin`.
/// Entries that fail normalization (cross-origin, unparsable) are dropped.
pub fn parse_sitemap_xml(xml: &str, origin: &str) -> Vec<String> {
    let Ok(base) = Url::parse(origin) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for block in URL_BLOCK_RE.captures_iter(xml) {
        let Some(inner) = block.get(1) else { continue };
        let Some(loc) = LOC_RE.captures(inner.as_str()).and_then(|c| c.get(1)) else {
            continue;
        };
        let loc = unescape_xml(loc.as_str());
        if let Some(normalized) = normalize_against(&loc, &base) {
            if seen.insert(normalized.clone()) {
                out.push(normalized);
            }
        }
    }
    out
}

fn unescape_xml(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}
