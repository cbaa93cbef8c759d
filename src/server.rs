//! HTTP API server.

use crate::config::{Config, QueryConfig};
use crate::handlers;
use crate::llm::{CompletionProvider, OpenAiClient};
use crate::rules::RuleEngine;
use crate::storage::SharedStorage;
use crate::{ExplorerError, Result};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: SharedStorage,
    pub rules: RuleEngine,
    pub limits: QueryConfig,
}

impl AppState {
    #[must_use]
    pub fn new(
        storage: SharedStorage,
        provider: Option<Arc<dyn CompletionProvider>>,
        config: &Config,
    ) -> Self {
        let rules = RuleEngine::new(storage.clone(), provider, config.llm.context_limit);
        Self {
            storage,
            rules,
            limits: config.query,
        }
    }

    /// Build state with the configured OpenAI-compatible client.
    ///
    /// A missing API key is not fatal: the server runs and rule execution
    /// reports the model as unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is configured but the client cannot be
    /// built.
    pub fn from_config(storage: SharedStorage, config: &Config) -> Result<Self> {
        let provider: Option<Arc<dyn CompletionProvider>> =
            match OpenAiClient::from_config(&config.llm) {
                Ok(client) => {
                    info!(model = %config.llm.model, base_url = %config.llm.base_url, "Language model configured");
                    Some(Arc::new(client) as Arc<dyn CompletionProvider>)
                }
                Err(ExplorerError::LlmNotConfigured { reason }) => {
                    warn!("Rule execution disabled: {}", reason);
                    None
                }
                Err(e) => return Err(e),
            };
        Ok(Self::new(storage, provider, config))
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Mentions and statistics
        .route("/api/keywords", get(handlers::keywords))
        .route("/api/mentions", get(handlers::mentions))
        .route("/api/stats/unique-authors", get(handlers::unique_authors))
        .route("/api/stats/authors", get(handlers::top_authors))
        .route("/api/stats/counts-by-day", get(handlers::counts_by_day))
        .route("/api/stats/sentiment", get(handlers::sentiment))
        // Rules
        .route(
            "/api/rules",
            get(handlers::list_rules).post(handlers::save_rule),
        )
        .route("/api/rules/execute", post(handlers::execute_rule))
        .route(
            "/api/rules/:id",
            get(handlers::get_rule).delete(handlers::delete_rule),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ExplorerError::with_context(format!("Failed to bind {addr}"), e))?;

    info!("API server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}
