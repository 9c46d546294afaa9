//! Scripted LLM Provider
//!
//! For tests and demos. Replays a fixed sequence of assistant turns (or
//! errors) and records every history it was handed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{AssistantTurn, GenerationOptions, LlmProvider};
use crate::tool::ToolSchema;

/// Provider that answers from a script
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<AssistantTurn>>>,
    /// Returned once the script is exhausted
    fallback: Option<AssistantTurn>,
    delay: Option<Duration>,
    submissions: AtomicUsize,
    histories: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Result<AssistantTurn>>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: None,
            delay: None,
            submissions: AtomicUsize::new(0),
            histories: Mutex::new(Vec::new()),
        }
    }

    /// Answer every submission with the same turn
    pub fn repeating(turn: AssistantTurn) -> Self {
        Self {
            fallback: Some(turn),
            ..Self::new(Vec::new())
        }
    }

    /// Simulate latency on every submission
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `submit` calls so far, failed ones included
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Histories received, one per submission
    pub async fn histories(&self) -> Vec<Vec<Message>> {
        self.histories.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn submit(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _options: &GenerationOptions,
    ) -> Result<AssistantTurn> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().await.push(messages.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(step) = self.script.lock().await.pop_front() {
            return step;
        }

        self.fallback
            .clone()
            .ok_or_else(|| AgentError::InvalidRequest("script exhausted".into()))
    }
}
