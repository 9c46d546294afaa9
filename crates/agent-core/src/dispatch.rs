//! Tool Dispatcher
//!
//! Executes one batch of tool calls against the registry. Failures never abort
//! the batch: an unknown tool, invalid arguments, an execution error or a
//! timeout each become an `is_error` result the LLM can react to.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult};

/// How calls within one batch are scheduled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// One call at a time, in emission order
    #[default]
    Sequential,
    /// All calls at once, subject to each tool's concurrency limit
    Parallel,
}

/// Executes tool-call batches
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    policy: DispatchPolicy,
    tool_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            policy: DispatchPolicy::default(),
            tool_timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub const fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Run a batch; one result per call, in call order
    pub async fn dispatch(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<ToolResult> {
        match self.policy {
            DispatchPolicy::Sequential => {
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    results.push(self.dispatch_one(call, ctx).await);
                }
                results
            }
            // join_all yields outputs in input order regardless of completion order
            DispatchPolicy::Parallel => {
                futures::future::join_all(calls.iter().map(|call| self.dispatch_one(call, ctx))).await
            }
        }
    }

    async fn dispatch_one(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        tracing::debug!(tool = %call.name, call_id = %call.id, "Executing tool");

        let mut result = match self.invoke(call, ctx).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                ToolResult::failure(&call.name, format!("Error: {e}"))
            }
        };
        result.name.clone_from(&call.name);
        result.with_id(call.id.clone())
    }

    async fn invoke(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult> {
        let tool = self.registry.resolve(&call.name)?;
        let _permit = tool.acquire().await?;

        tokio::time::timeout(self.tool_timeout, tool.invoke(call, ctx))
            .await
            .map_err(|_| AgentError::ToolTimeout {
                name: call.name.clone(),
                ms: u64::try_from(self.tool_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ParameterSchema, Tool, ToolSchema};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Sleeps for `delay_ms` and records its execution window
    struct TimedTool {
        name: &'static str,
        max_concurrency: usize,
        log: Arc<Mutex<Vec<(String, Instant, Instant)>>>,
    }

    #[async_trait]
    impl Tool for TimedTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name.into(),
                description: "Sleep then echo".into(),
                parameters: vec![ParameterSchema::required("delay_ms", "integer", "Delay")],
                category: None,
                has_side_effects: true,
                max_concurrency: self.max_concurrency,
            }
        }

        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> Result<ToolResult> {
            let start = Instant::now();
            let delay = call.u64_arg("delay_ms").unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if call.str_arg("fail").is_some() {
                return Err(AgentError::ToolExecution("permission denied".into()));
            }
            self.log
                .lock()
                .unwrap()
                .push((call.id.clone(), start, Instant::now()));
            Ok(ToolResult::success(self.name, format!("done {}", call.id)))
        }
    }

    type Log = Arc<Mutex<Vec<(String, Instant, Instant)>>>;

    fn registry(max_concurrency: usize) -> (Arc<ToolRegistry>, Log) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry
            .register(TimedTool {
                name: "work",
                max_concurrency,
                log: log.clone(),
            })
            .unwrap();
        (Arc::new(registry), log)
    }

    fn call(id: &str, delay_ms: u64) -> ToolCall {
        ToolCall::new(id, "work", serde_json::json!({ "delay_ms": delay_ms }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_batch_never_overlaps() {
        let (registry, log) = registry(4);
        let dispatcher = ToolDispatcher::new(registry);
        let calls = vec![call("a", 30), call("b", 10), call("c", 20), call("d", 5)];

        let results = dispatcher.dispatch(&calls, &ToolContext::new()).await;

        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(results.iter().all(|r| !r.is_error));

        let log = log.lock().unwrap();
        let order: Vec<_> = log.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        for pair in log.windows(2) {
            assert!(pair[0].2 <= pair[1].1, "{} overlapped {}", pair[0].0, pair[1].0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_abort_batch() {
        let (registry, _log) = registry(1);
        let dispatcher = ToolDispatcher::new(registry);
        let calls = vec![
            call("a", 1),
            ToolCall::new("b", "work", serde_json::json!({"delay_ms": 1, "fail": "yes"})),
            ToolCall::new("c", "missing_tool", serde_json::json!({})),
            ToolCall::new("d", "work", serde_json::json!({})),
            ToolCall::malformed("f", "work", "{\"delay_ms\": "),
            call("e", 1),
        ];

        let results = dispatcher.dispatch(&calls, &ToolContext::new()).await;

        assert_eq!(results.len(), 6);
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert!(results[1].output.contains("permission denied"));
        assert!(results[2].is_error);
        assert!(results[2].output.contains("Unknown tool"));
        assert_eq!(results[2].name, "missing_tool");
        assert!(results[3].is_error);
        assert!(results[3].output.contains("delay_ms"));
        assert!(results[4].is_error);
        assert!(results[4].output.contains("not valid JSON"));
        assert_eq!(results[4].tool_call_id, "f");
        assert!(!results[5].is_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout_is_recorded_as_error() {
        let (registry, _log) = registry(1);
        let dispatcher = ToolDispatcher::new(registry).with_timeout(Duration::from_millis(50));

        let results = dispatcher
            .dispatch(&[call("slow", 500), call("fast", 1)], &ToolContext::new())
            .await;

        assert!(results[0].is_error);
        assert!(results[0].output.contains("timed out"));
        assert!(!results[1].is_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_results_realigned_to_input_order() {
        let (registry, log) = registry(4);
        let dispatcher = ToolDispatcher::new(registry).with_policy(DispatchPolicy::Parallel);

        let results = dispatcher
            .dispatch(&[call("slow", 50), call("quick", 5)], &ToolContext::new())
            .await;

        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "quick"]);

        let log = log.lock().unwrap();
        assert_eq!(log[0].0, "quick", "quick call should finish first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_policy_respects_concurrency_limit() {
        let (registry, log) = registry(1);
        let dispatcher = ToolDispatcher::new(registry).with_policy(DispatchPolicy::Parallel);

        dispatcher
            .dispatch(&[call("a", 20), call("b", 20), call("c", 20)], &ToolContext::new())
            .await;

        let mut log = log.lock().unwrap().clone();
        log.sort_by_key(|(_, start, _)| *start);
        for pair in log.windows(2) {
            assert!(pair[0].2 <= pair[1].1);
        }
    }
}
