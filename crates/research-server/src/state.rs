//! Application State

use std::sync::Arc;

use agent_core::{LlmProvider, MemorySessionStore};
use research_assistant::ResearchDesk;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// LLM provider, kept for health checks
    pub provider: Arc<dyn LlmProvider>,

    /// Research runner with its tools wired in
    pub desk: Arc<ResearchDesk>,

    /// Finished sessions, for inspection after a run
    pub sessions: Arc<MemorySessionStore>,
}
