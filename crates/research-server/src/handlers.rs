//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use agent_core::{ConversationSession, FailureKind, SessionId, SessionStore};
use research_assistant::{ResearchOutcome, ResearchRequest};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub llm_provider: String,
    pub llm_connected: bool,
    pub tools: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        llm_provider: state.provider.name().to_string(),
        llm_connected,
        tools: state
            .desk
            .controller()
            .tools()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

/// Run one research task to a terminal state
///
/// The run lives on its own task; if the client goes away the drop guard
/// cancels it before the next LLM round-trip.
pub async fn research_handler(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<(StatusCode, Json<ResearchOutcome>), ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let desk = state.desk.clone();
    let run = tokio::spawn(async move { desk.run_research(&payload, cancel).await });

    let report = run.await.map_err(|e| {
        tracing::error!("Research task aborted: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Research run aborted unexpectedly",
            "RUN_ABORTED",
        )
    })?;

    if let Some(session) = &report.session {
        if let Err(e) = state.sessions.save(session) {
            tracing::warn!(session_id = %session.id, "Failed to store session: {}", e);
        }
    }

    let status = match &report.outcome {
        ResearchOutcome::Error {
            error_kind: FailureKind::InvalidRequest,
            session_id: None,
            ..
        } => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    Ok((status, Json(report.outcome)))
}

/// Drop a finished run's transcript once the caller has it
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = SessionId::from_string(id);
    match state.sessions.delete(&id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No session with id {id}"),
            "SESSION_NOT_FOUND",
        )),
        Err(e) => {
            tracing::error!("Session store error: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.user_message(),
                "SESSION_STORE_ERROR",
            ))
        }
    }
}

/// Transcript of a finished run
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationSession>, ApiError> {
    let id = SessionId::from_string(id);
    match state.sessions.load(&id) {
        Ok(Some(session)) => Ok(Json(session)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No session with id {id}"),
            "SESSION_NOT_FOUND",
        )),
        Err(e) => {
            tracing::error!("Session store error: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.user_message(),
                "SESSION_STORE_ERROR",
            ))
        }
    }
}
