//! Run Controller
//!
//! Drives a `ConversationSession` through its state machine:
//!
//! ```text
//! pending ──► running ──► completed
//!               │  ▲
//!               ▼  │
//!          awaiting_tools        (any non-terminal) ──► failed
//! ```
//!
//! Each `advance()` performs exactly one transition. The only suspension
//! points are the LLM submission (with bounded retry) and the tool batch.
//! Cancellation is observed before a round-trip or retry starts, never while a
//! tool is running.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::dispatch::{DispatchPolicy, ToolDispatcher};
use crate::error::{AgentError, Result};
use crate::provider::{AssistantTurn, GenerationOptions, LlmProvider};
use crate::retry::RetryPolicy;
use crate::session::{ConversationSession, RunOutcome, SessionStatus};
use crate::tool::{Tool, ToolCall, ToolRegistry, ToolSchema};

/// Run controller configuration
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Agent persona
    pub system_prompt: String,

    /// Maximum LLM round-trips per session
    pub max_iterations: usize,

    /// Time budget for one LLM submission attempt
    pub llm_timeout: Duration,

    /// Retry policy for failed submissions
    pub retry: RetryPolicy,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            llm_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            generation: GenerationOptions::default(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Use the provided tools when they help, then answer concisely.";

/// Drives sessions to a terminal state
#[derive(Clone)]
pub struct RunController {
    provider: Arc<dyn LlmProvider>,
    dispatcher: ToolDispatcher,
    tool_schemas: Vec<ToolSchema>,
    config: RunConfig,
    cancel: CancellationToken,
}

impl RunController {
    pub fn new(provider: Arc<dyn LlmProvider>, dispatcher: ToolDispatcher, config: RunConfig) -> Self {
        let tool_schemas = dispatcher.registry().schemas();
        Self {
            provider,
            dispatcher,
            tool_schemas,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Same controller, observing a different cancellation token
    #[must_use]
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    /// A pending session for `task` with this controller's persona
    ///
    /// Tool schemas travel with each submission, so the persona is used as is.
    pub fn new_session(&self, task: impl Into<String>) -> ConversationSession {
        ConversationSession::new(self.config.system_prompt.clone(), task)
    }

    /// Perform one state transition
    ///
    /// Run-level failures (transport exhaustion, iteration cap, cancellation)
    /// end the session in `failed` and are reported through its status. Only
    /// advancing a session that is already terminal returns an error.
    pub async fn advance(&self, session: &mut ConversationSession) -> Result<SessionStatus> {
        session.ensure_mutable()?;

        let step = match session.status() {
            SessionStatus::Pending => session.set_status(SessionStatus::Running),
            SessionStatus::Running => self.round_trip(session).await,
            SessionStatus::AwaitingTools => self.run_tools(session).await,
            SessionStatus::Completed | SessionStatus::Failed => Ok(()),
        };

        if let Err(e) = step {
            self.fail(session, &e)?;
        }

        Ok(session.status())
    }

    /// Advance until terminal
    pub async fn run(&self, session: &mut ConversationSession) -> Result<RunOutcome> {
        session.ensure_mutable()?;

        while !session.is_terminal() {
            self.advance(session).await?;
        }

        session
            .outcome()
            .ok_or_else(|| AgentError::Session("terminal session without outcome".into()))
    }

    /// Create a session for `task` and run it to completion
    pub async fn ask(&self, task: &str) -> Result<ConversationSession> {
        let mut session = self.new_session(task);
        self.run(&mut session).await?;
        Ok(session)
    }

    async fn round_trip(&self, session: &mut ConversationSession) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if session.round_trips() >= self.config.max_iterations {
            return Err(AgentError::MaxIterations(self.config.max_iterations));
        }

        let turn = self.submit_with_retry(session).await?;
        session.record_round_trip()?;

        if let Some(usage) = &turn.usage {
            tracing::debug!(
                session_id = %session.id,
                round_trip = session.round_trips(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                finish_reason = ?turn.finish_reason,
                "LLM usage"
            );
        }

        let content = turn.trimmed_content().to_string();

        if !turn.tool_calls.is_empty() {
            let calls = Self::assign_call_ids(session, turn.tool_calls);
            tracing::debug!(
                session_id = %session.id,
                round_trip = session.round_trips(),
                calls = calls.len(),
                "Assistant requested tools"
            );
            return session.push_tool_request(content, calls);
        }

        if content.is_empty() {
            return Err(AgentError::EmptyResponse);
        }

        tracing::info!(
            session_id = %session.id,
            round_trips = session.round_trips(),
            "Run completed"
        );
        session.complete(content)
    }

    async fn submit_with_retry(&self, session: &ConversationSession) -> Result<AssistantTurn> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let timeout_ms = u64::try_from(self.config.llm_timeout.as_millis()).unwrap_or(u64::MAX);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let submission = self.provider.submit(
                session.messages(),
                &self.tool_schemas,
                &self.config.generation,
            );
            let result = tokio::time::timeout(self.config.llm_timeout, submission)
                .await
                .unwrap_or_else(|_| Err(AgentError::LlmTimeout(timeout_ms)));

            let err = match result {
                Ok(turn) => return Ok(turn),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                return Err(AgentError::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }

            let delay = self.config.retry.delay_for(attempt);
            tracing::warn!(
                session_id = %session.id,
                provider = self.provider.name(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "LLM call failed, retrying"
            );

            tokio::select! {
                () = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_tools(&self, session: &mut ConversationSession) -> Result<()> {
        let calls = session.conversation().pending_tool_calls();
        let results = self.dispatcher.dispatch(&calls, session.tool_context()).await;

        let failed = results.iter().filter(|r| r.is_error).count();
        tracing::debug!(
            session_id = %session.id,
            calls = results.len(),
            failed,
            "Tool batch finished"
        );

        session.push_tool_results(results)?;
        session.set_status(SessionStatus::Running)
    }

    /// Give missing or reused call IDs a fresh UUID
    fn assign_call_ids(session: &ConversationSession, calls: Vec<ToolCall>) -> Vec<ToolCall> {
        let mut seen: HashSet<String> = session
            .conversation()
            .issued_call_ids()
            .into_iter()
            .map(str::to_string)
            .collect();

        calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_empty() || seen.contains(&call.id) {
                    call.id = uuid::Uuid::new_v4().to_string();
                }
                seen.insert(call.id.clone());
                call
            })
            .collect()
    }

    fn fail(&self, session: &mut ConversationSession, err: &AgentError) -> Result<()> {
        match err {
            AgentError::Cancelled => {
                tracing::warn!(session_id = %session.id, "Run cancelled");
            }
            _ => tracing::error!(
                session_id = %session.id,
                provider = self.provider.name(),
                kind = %err.failure_kind(),
                error = %err,
                "Run failed"
            ),
        }
        session.fail(err)
    }
}

/// Builder for the run controller
pub struct RunControllerBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: RunConfig,
    dispatch_policy: DispatchPolicy,
    tool_timeout: Duration,
}

impl Default for RunControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControllerBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: RunConfig::default(),
            dispatch_policy: DispatchPolicy::Sequential,
            tool_timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Result<Self> {
        self.tools.register(tool)?;
        Ok(self)
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    #[must_use]
    pub const fn llm_timeout(mut self, timeout: Duration) -> Self {
        self.config.llm_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub const fn dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch_policy = policy;
        self
    }

    pub fn build(self) -> Result<RunController> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        let dispatcher = ToolDispatcher::new(Arc::new(self.tools))
            .with_policy(self.dispatch_policy)
            .with_timeout(self.tool_timeout);

        Ok(RunController::new(provider, dispatcher, self.config))
    }
}
