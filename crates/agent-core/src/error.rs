//! Error Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{SessionId, SessionStatus};

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Tool not found in registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool name registered twice
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Tool invocation exceeded its time budget
    #[error("Tool '{name}' timed out after {ms}ms")]
    ToolTimeout { name: String, ms: u64 },

    /// LLM transport failure (connection, 5xx, malformed response body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Rate limited by the LLM service
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The LLM service rejected the request itself
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// LLM call exceeded its time budget
    #[error("LLM call timed out after {0}ms")]
    LlmTimeout(u64),

    /// Bounded retry gave up
    #[error("LLM call failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// Round-trip cap reached in the run loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Mutation attempted on a finished session
    #[error("Session {id} is {status} and cannot be advanced")]
    InvalidSessionState { id: SessionId, status: SessionStatus },

    /// Run cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,

    /// Assistant returned neither content nor tool calls
    #[error("Assistant returned an empty response")]
    EmptyResponse,

    /// Session bookkeeping error
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

/// Caller-visible classification of a failed run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LlmTransport,
    MaxIterationsExceeded,
    InvalidRequest,
    Cancelled,
    EmptyResponse,
    InvalidSessionState,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LlmTransport => "llm_transport",
            Self::MaxIterationsExceeded => "max_iterations_exceeded",
            Self::InvalidRequest => "invalid_request",
            Self::Cancelled => "cancelled",
            Self::EmptyResponse => "empty_response",
            Self::InvalidSessionState => "invalid_session_state",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited(_) | Self::LlmTimeout(_) | Self::Io(_)
        )
    }

    /// Classify for the caller boundary
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transport(_)
            | Self::RateLimited(_)
            | Self::LlmTimeout(_)
            | Self::RetriesExhausted { .. }
            | Self::Io(_) => FailureKind::LlmTransport,
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::MaxIterations(_) => FailureKind::MaxIterationsExceeded,
            Self::Cancelled => FailureKind::Cancelled,
            Self::EmptyResponse => FailureKind::EmptyResponse,
            Self::InvalidSessionState { .. } => FailureKind::InvalidSessionState,
            _ => FailureKind::Internal,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownTool(name) => format!("The tool '{name}' is not available."),
            Self::DuplicateTool(name) => format!("The tool '{name}' is registered twice."),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::ToolTimeout { name, .. } => format!("The tool '{name}' took too long to respond."),
            Self::Transport(_) | Self::LlmTimeout(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::RetriesExhausted { attempts, .. } => {
                format!("The AI service did not respond after {attempts} attempts. Please try again later.")
            }
            Self::RateLimited(_) => "The AI service is rate limiting requests. Please wait a moment.".into(),
            Self::InvalidRequest(msg) => format!("The AI service rejected the request: {msg}"),
            Self::MaxIterations(n) => {
                format!("The agent did not reach an answer within {n} round-trips.")
            }
            Self::InvalidSessionState { status, .. } => {
                format!("The research session is already {status}.")
            }
            Self::Cancelled => "The request was cancelled.".into(),
            Self::EmptyResponse => "The AI service returned an empty answer.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
