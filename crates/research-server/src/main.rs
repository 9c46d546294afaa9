//! research-server
//!
//! Axum server exposing research runs over HTTP.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::session::DEFAULT_SESSION_CAPACITY;
use agent_core::{LlmProvider, MemorySessionStore};
use agent_runtime::{OllamaConfig, OllamaProvider};
use research_assistant::{ResearchConfig, ResearchDesk};

use crate::handlers::{delete_session, get_session, health_check, research_handler};
use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/research", post(research_handler))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize LLM provider
    let ollama_config = OllamaConfig::from_env();
    let model = ollama_config.model.clone();
    let provider: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::from_config(ollama_config)?);

    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to Ollama (model {})", model),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ Ollama not available - research runs will fail");
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    // Backends and tools
    let config = ResearchConfig::from_env();
    let search = config.build_search_backend()?;
    let tracker = config.build_issue_tracker()?;
    tracing::info!(
        search = search.name(),
        tracker = tracker.name(),
        max_iterations = config.max_iterations,
        "Research backends ready"
    );

    let desk = ResearchDesk::new(provider.clone(), search, tracker, &config)?;
    for name in desk.controller().tools().names() {
        tracing::info!("  • {}", name);
    }

    let session_capacity = std::env::var("SESSION_CAPACITY")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_SESSION_CAPACITY);
    tracing::info!(session_capacity, "Keeping the most recent sessions in memory");

    let state = AppState {
        provider,
        desk: Arc::new(desk),
        sessions: Arc::new(MemorySessionStore::with_capacity(session_capacity)),
    };

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 research-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health             - Health check");
    tracing::info!("  POST /api/research       - Run a research task");
    tracing::info!("  GET  /api/sessions/{{id}}  - Session transcript");
    tracing::info!("  DELETE /api/sessions/{{id}} - Discard a transcript");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
