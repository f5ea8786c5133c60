// Sitesmith backend - Application state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use sqlx::PgPool;

use crate::config::{Config, HandoffBackend};
use crate::github::GitHubClient;
use crate::handoff::{HandoffStore, MemoryHandoffStore, PgHandoffStore};
use crate::identity::IdentityClient;
use crate::llm::LlmClient;
use crate::storage::SnapshotStorage;

/// Central application state. Clone-friendly: the pool, clients and store
/// are all cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    /// Shared HTTP client for scraping; upstream clients hold clones of it.
    pub client: Client,
    pub github: GitHubClient,
    pub llm: LlmClient,
    pub identity: IdentityClient,
    pub storage: SnapshotStorage,
    pub handoff: Arc<dyn HandoffStore>,
    pub start_time: Instant,
    /// `true` once migrations have run.
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("Backend marked as READY");
    }
}

impl AppState {
    pub fn new(config: Config, db: PgPool) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self::with_client(config, db, client))
    }

    pub fn with_client(config: Config, db: PgPool, client: Client) -> Self {
        let handoff: Arc<dyn HandoffStore> = match config.handoff_backend {
            HandoffBackend::Postgres => Arc::new(PgHandoffStore::new(db.clone(), config.handoff_ttl)),
            HandoffBackend::Memory => Arc::new(MemoryHandoffStore::new(config.handoff_ttl)),
        };

        let github = GitHubClient::new(client.clone(), config.github_token.clone(), config.github_api_base.clone());
        let llm = LlmClient::new(
            client.clone(),
            config.anthropic_api_key.clone(),
            config.anthropic_api_base.clone(),
            config.llm_model.clone(),
            config.llm_max_tokens,
        );
        let identity = IdentityClient::new(client.clone(), config.supabase_url.clone(), config.supabase_anon_key.clone());
        let storage = SnapshotStorage::new(
            client.clone(),
            config.supabase_url.clone(),
            config.supabase_service_key.clone(),
            config.snapshot_bucket.clone(),
        );

        tracing::info!(
            handoff = ?config.handoff_backend,
            github = config.github_token.is_some(),
            llm = config.anthropic_api_key.is_some(),
            snapshots = storage.is_configured(),
            template = ?config.template_repo.as_ref().map(|r| r.to_string()),
            "AppState initialised"
        );

        Self {
            db,
            config: Arc::new(config),
            client,
            github,
            llm,
            identity,
            storage,
            handoff,
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }
}
