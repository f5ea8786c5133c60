pub mod auth;
pub mod config;
pub mod github;
pub mod handlers;
pub mod handoff;
pub mod identity;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod scrape;
pub mod state;
pub mod storage;
pub mod store;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use state::AppState;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        // Auth
        .route("/api/auth/handoff", post(handlers::issue_handoff))
        // Scraping
        .route("/api/scrape/discover", post(handlers::scrape_discover))
        .route("/api/scrape/page", post(handlers::scrape_page))
        // Brief & generation
        .route("/api/brief/chat", post(handlers::brief_chat))
        .route("/api/generate/file", post(handlers::generate_file))
        .route("/api/generate/config", post(handlers::generate_config))
        // Client sites
        .route("/api/sites/commit", post(handlers::commit_site))
        .route("/api/sites/edit", post(handlers::edit_site))
        .route("/api/sites/file", get(handlers::read_site_file))
        .route("/api/clients/{id}", get(handlers::get_client))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        // Health
        .route("/api/health", get(handlers::health))
        .route("/api/health/ready", get(handlers::readiness))
        // Public auth
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/handoff/redeem", post(handlers::redeem_handoff))
        .merge(protected)
        // Shared state
        .with_state(state)
}
