//! Process configuration, read once from the environment at start-up.
//!
//! `.env` is loaded through `dotenvy` before any variable is read. Only
//! `DATABASE_URL` is required; every upstream integration is optional and a
//! handler that needs a missing one fails with a clear error instead.

use std::time::Duration;

use crate::github::{RepoRef, DEFAULT_API_BASE as GITHUB_API_BASE};
use crate::llm::{DEFAULT_API_BASE as LLM_API_BASE, DEFAULT_MODEL};

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_HANDOFF_TTL_SECS: u64 = 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_SNAPSHOT_BUCKET: &str = "snapshots";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffBackend {
    Postgres,
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub github_token: Option<String>,
    pub github_api_base: String,
    /// Repository the site template files are read from.
    pub template_repo: Option<RepoRef>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_api_base: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: String,
    pub supabase_service_key: Option<String>,
    pub snapshot_bucket: String,
    pub handoff_backend: HandoffBackend,
    pub handoff_ttl: Duration,
    pub fetch_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("allowed_origins", &self.allowed_origins)
            .field("github_api_base", &self.github_api_base)
            .field("template_repo", &self.template_repo)
            .field("llm_model", &self.llm_model)
            .field("supabase_url", &self.supabase_url)
            .field("handoff_backend", &self.handoff_backend)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            port: DEFAULT_PORT,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            github_token: None,
            github_api_base: GITHUB_API_BASE.to_string(),
            template_repo: None,
            anthropic_api_key: None,
            anthropic_api_base: LLM_API_BASE.to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            llm_max_tokens: DEFAULT_LLM_MAX_TOKENS,
            supabase_url: None,
            supabase_anon_key: String::new(),
            supabase_service_key: None,
            snapshot_bucket: DEFAULT_SNAPSHOT_BUCKET.to_string(),
            handoff_backend: HandoffBackend::Postgres,
            handoff_ttl: Duration::from_secs(DEFAULT_HANDOFF_TTL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let template_repo = match get("TEMPLATE_REPO") {
            Some(raw) => Some(RepoRef::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                key: "TEMPLATE_REPO",
                message: format!("'{}' is not owner/name[@branch]", raw),
            })?),
            None => None,
        };

        let handoff_backend = match get("HANDOFF_STORE").as_deref() {
            None | Some("postgres") => HandoffBackend::Postgres,
            Some("memory") => HandoffBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "HANDOFF_STORE",
                    message: format!("'{}' is not one of postgres, memory", other),
                });
            }
        };

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        Ok(Self {
            database_url,
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            allowed_origins,
            github_token: get("GITHUB_TOKEN"),
            github_api_base: get("GITHUB_API_BASE").unwrap_or(defaults.github_api_base),
            template_repo,
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            anthropic_api_base: get("ANTHROPIC_API_BASE").unwrap_or(defaults.anthropic_api_base),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_max_tokens: parse_or("LLM_MAX_TOKENS", get("LLM_MAX_TOKENS"), defaults.llm_max_tokens)?,
            supabase_url: get("SUPABASE_URL"),
            supabase_anon_key: get("SUPABASE_ANON_KEY").unwrap_or_default(),
            supabase_service_key: get("SUPABASE_SERVICE_KEY"),
            snapshot_bucket: get("SNAPSHOT_BUCKET").unwrap_or(defaults.snapshot_bucket),
            handoff_backend,
            handoff_ttl: Duration::from_secs(parse_or(
                "HANDOFF_TTL_SECS",
                get("HANDOFF_TTL_SECS"),
                DEFAULT_HANDOFF_TTL_SECS,
            )?),
            fetch_timeout: Duration::from_secs(parse_or(
                "FETCH_TIMEOUT_SECS",
                get("FETCH_TIMEOUT_SECS"),
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid { key, message: e.to_string() }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/x")])).unwrap();
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.handoff_ttl, Duration::from_secs(60));
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(8));
        assert_eq!(cfg.handoff_backend, HandoffBackend::Postgres);
        assert!(cfg.template_repo.is_none());
    }

    #[test]
    fn parses_lists_and_repo() {
        let cfg = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("ALLOWED_ORIGINS", "https://app.example.com/, http://localhost:5173 ,"),
            ("TEMPLATE_REPO", "acme/site-template@main"),
            ("HANDOFF_STORE", "memory"),
            ("PORT", "9000"),
        ]))
        .unwrap();
        assert_eq!(cfg.allowed_origins, vec!["https://app.example.com", "http://localhost:5173"]);
        let repo = cfg.template_repo.unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.branch.as_deref(), Some("main"));
        assert_eq!(cfg.handoff_backend, HandoffBackend::Memory);
        assert_eq!(cfg.port, 9000);
    }

    #[test]
    fn bad_values_name_the_key() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "x"), ("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "x"), ("HANDOFF_STORE", "redis")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "HANDOFF_STORE", .. }));
    }
}
