//! Session Management
//!
//! A `ConversationSession` owns the message history and run status of one
//! task. Only the run controller mutates it; once the session reaches
//! `completed` or `failed` every mutation is refused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{AgentError, FailureKind, Result};
use crate::message::{Conversation, Message};
use crate::tool::{ToolCall, ToolContext, ToolResult};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run status of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    AwaitingTools,
    Completed,
    Failed,
}

impl SessionStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::AwaitingTools => "awaiting_tools",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a session failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl From<&AgentError> for RunFailure {
    fn from(err: &AgentError) -> Self {
        Self {
            kind: err.failure_kind(),
            detail: err.to_string(),
        }
    }
}

/// Terminal result of a run, as handed to the caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { final_message: String },
    Failed(RunFailure),
}

/// One research task's conversation and run state
///
/// Serializable as a whole; the message sequence plus status is the unit of
/// persistence and restore.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Unique identifier
    pub id: SessionId,

    conversation: Conversation,
    status: SessionStatus,
    round_trips: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<RunFailure>,

    #[serde(default, skip_serializing_if = "ToolContext::is_empty")]
    tool_context: ToolContext,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    /// Create a pending session from the agent persona and the task prompt
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut conversation = Conversation::with_system_prompt(system_prompt);
        conversation.push(Message::user(user_prompt));

        Self {
            id: SessionId::new(),
            conversation,
            status: SessionStatus::Pending,
            round_trips: 0,
            final_message: None,
            failure: None,
            tool_context: ToolContext::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Values handed to every tool invoked during this run
    #[must_use]
    pub fn with_tool_context(mut self, tool_context: ToolContext) -> Self {
        self.tool_context = tool_context;
        self
    }

    pub const fn tool_context(&self) -> &ToolContext {
        &self.tool_context
    }

    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// LLM round-trips completed so far
    pub const fn round_trips(&self) -> usize {
        self.round_trips
    }

    /// Final assistant answer, once completed
    pub fn final_message(&self) -> Option<&str> {
        self.final_message.as_deref()
    }

    pub const fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    /// Outcome once the session is terminal
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self.status {
            SessionStatus::Completed => Some(RunOutcome::Completed {
                final_message: self.final_message.clone().unwrap_or_default(),
            }),
            SessionStatus::Failed => Some(RunOutcome::Failed(self.failure.clone().unwrap_or_else(
                || RunFailure {
                    kind: FailureKind::Internal,
                    detail: "failed without a recorded cause".into(),
                },
            ))),
            _ => None,
        }
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }

    pub(crate) fn ensure_mutable(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AgentError::InvalidSessionState {
                id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) -> Result<()> {
        self.ensure_mutable()?;
        tracing::debug!(session_id = %self.id, from = %self.status, to = %status, "Session transition");
        self.status = status;
        self.touch();
        Ok(())
    }

    pub(crate) fn record_round_trip(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.round_trips += 1;
        Ok(())
    }

    /// Append the assistant's tool-calling turn and wait for dispatch
    pub(crate) fn push_tool_request(&mut self, content: String, calls: Vec<ToolCall>) -> Result<()> {
        self.ensure_mutable()?;
        self.conversation.push(Message::assistant_with_tools(content, calls));
        self.set_status(SessionStatus::AwaitingTools)
    }

    /// Append one tool message per result; every ID must be pending
    pub(crate) fn push_tool_results(&mut self, results: Vec<ToolResult>) -> Result<()> {
        self.ensure_mutable()?;
        let pending = self.conversation.pending_tool_calls();

        for result in &results {
            if !pending.iter().any(|c| c.id == result.tool_call_id) {
                return Err(AgentError::Session(format!(
                    "tool result '{}' does not answer a pending call",
                    result.tool_call_id
                )));
            }
        }

        for result in results {
            let content = result.to_message_content();
            self.conversation
                .push(Message::tool(content, result.tool_call_id, result.name));
        }
        self.touch();
        Ok(())
    }

    /// Append the final answer and finish
    pub(crate) fn complete(&mut self, content: String) -> Result<()> {
        self.ensure_mutable()?;
        self.conversation.push(Message::assistant(content.clone()));
        self.final_message = Some(content);
        self.set_status(SessionStatus::Completed)
    }

    /// Finish with a failure
    pub(crate) fn fail(&mut self, err: &AgentError) -> Result<()> {
        self.ensure_mutable()?;
        self.failure = Some(RunFailure::from(err));
        self.set_status(SessionStatus::Failed)
    }
}

/// Session store trait for persistence
pub trait SessionStore: Send + Sync {
    /// Save a session
    fn save(&self, session: &ConversationSession) -> Result<()>;

    /// Load a session by ID
    fn load(&self, id: &SessionId) -> Result<Option<ConversationSession>>;

    /// Delete a session; returns whether it existed
    fn delete(&self, id: &SessionId) -> Result<bool>;
}

/// Sessions a `MemorySessionStore` keeps unless told otherwise
pub const DEFAULT_SESSION_CAPACITY: usize = 256;

/// In-memory session store
///
/// Bounded: once `capacity` sessions are held, saving another evicts the
/// least recently updated one.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, ConversationSession>>,
    capacity: usize,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of sessions held
    pub fn count(&self) -> Result<usize> {
        Ok(self.sessions.read().map_err(poisoned)?.len())
    }
}

fn poisoned<T>(_: T) -> AgentError {
    AgentError::Session("session store lock poisoned".into())
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &ConversationSession) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session.id.clone(), session.clone());

        while sessions.len() > self.capacity {
            let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.updated_at)
                .map(|s| s.id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            tracing::debug!(session_id = %oldest, capacity = self.capacity, "Evicted session");
        }
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<Option<ConversationSession>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(id).cloned())
    }

    fn delete(&self, id: &SessionId) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions.remove(id).is_some())
    }
}
