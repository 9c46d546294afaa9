//! Research Runs
//!
//! `ResearchDesk::run_research` is the caller-facing operation: it validates
//! the request, starts a session with the research persona, drives it to a
//! terminal state and reports a structured outcome. Errors never escape as
//! anything but `ResearchOutcome::Error`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use agent_core::{
    ConversationSession, FailureKind, LlmProvider, RunController, RunOutcome, ToolContext,
    ToolDispatcher, ToolRegistry,
};

use crate::config::ResearchConfig;
use crate::model::RepoRef;
use crate::search::SearchBackend;
use crate::svckit::{CreateIssueTool, SearchTool};
use crate::tracker::IssueTracker;
use crate::RESEARCH_PROMPT;

/// Upper bound on issues one run may be asked to file
pub const MAX_ISSUE_COUNT: u32 = 20;

/// A research task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    pub target_repo: String,
    pub issue_count: u32,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>, target_repo: impl Into<String>, issue_count: u32) -> Self {
        Self {
            topic: topic.into(),
            target_repo: target_repo.into(),
            issue_count,
        }
    }

    fn validate(&self) -> Result<RepoRef, String> {
        if self.topic.trim().is_empty() {
            return Err("topic must not be empty".into());
        }
        if self.issue_count == 0 || self.issue_count > MAX_ISSUE_COUNT {
            return Err(format!(
                "issue_count must be between 1 and {MAX_ISSUE_COUNT}, got {}",
                self.issue_count
            ));
        }
        RepoRef::parse(&self.target_repo).map_err(|e| e.to_string())
    }

    /// The user message that starts the session
    pub fn task_prompt(&self, repo: &RepoRef) -> String {
        let topic = self.topic.trim();
        let n = self.issue_count;
        format!(
            "Research the topic \"{topic}\".\n\n\
             1. Use the `search` tool to find relevant papers (ask for at least {n} results).\n\
             2. Pick the {n} most relevant results.\n\
             3. For each selected result, call `create_issue` exactly once with repo \"{repo}\", \
             a distinct title naming the paper, and a Markdown body that summarises it and links to it.\n\
             4. When all {n} issues exist, reply with a short summary listing the issue URLs."
        )
    }
}

/// Caller-visible result of a research run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResearchOutcome {
    Success {
        final_message: String,
        session_id: String,
    },
    Error {
        error_kind: FailureKind,
        error_detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

impl ResearchOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn from_session(session: &ConversationSession) -> Self {
        let session_id = session.id.to_string();
        match session.outcome() {
            Some(RunOutcome::Completed { final_message }) => Self::Success {
                final_message,
                session_id,
            },
            Some(RunOutcome::Failed(failure)) => Self::Error {
                error_kind: failure.kind,
                error_detail: failure.detail,
                session_id: Some(session_id),
            },
            None => Self::Error {
                error_kind: FailureKind::Internal,
                error_detail: format!("session stopped in state {}", session.status()),
                session_id: Some(session_id),
            },
        }
    }
}

/// Outcome plus the finished session (absent when the request was rejected)
#[derive(Debug)]
pub struct ResearchReport {
    pub outcome: ResearchOutcome,
    pub session: Option<ConversationSession>,
}

/// Runs research tasks against a fixed set of tools
#[derive(Clone)]
pub struct ResearchDesk {
    controller: RunController,
}

impl ResearchDesk {
    /// Wire the search and issue tools into a run controller
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchBackend>,
        tracker: Arc<dyn IssueTracker>,
        config: &ResearchConfig,
    ) -> agent_core::Result<Self> {
        let mut tools = ToolRegistry::new();
        tools.register(SearchTool::new(search))?;
        tools.register(CreateIssueTool::new(tracker))?;

        let dispatcher = ToolDispatcher::new(Arc::new(tools)).with_timeout(config.tool_timeout());
        let mut run_config = config.run_config();
        run_config.system_prompt = RESEARCH_PROMPT.into();

        Ok(Self {
            controller: RunController::new(provider, dispatcher, run_config),
        })
    }

    pub const fn controller(&self) -> &RunController {
        &self.controller
    }

    /// Run one research task to completion or failure
    pub async fn run_research(
        &self,
        request: &ResearchRequest,
        cancel: CancellationToken,
    ) -> ResearchReport {
        let repo = match request.validate() {
            Ok(repo) => repo,
            Err(detail) => {
                tracing::warn!(%detail, "Rejected research request");
                return ResearchReport {
                    outcome: ResearchOutcome::Error {
                        error_kind: FailureKind::InvalidRequest,
                        error_detail: detail,
                        session_id: None,
                    },
                    session: None,
                };
            }
        };

        let controller = self.controller.with_cancellation(cancel);
        let mut session = controller
            .new_session(request.task_prompt(&repo))
            .with_tool_context(
                ToolContext::new().with(CreateIssueTool::ALLOWED_REPO, repo.to_string()),
            );
        tracing::info!(
            session_id = %session.id,
            topic = %request.topic,
            repo = %repo,
            issue_count = request.issue_count,
            "Starting research run"
        );

        let outcome = match controller.run(&mut session).await {
            Ok(_) => ResearchOutcome::from_session(&session),
            Err(e) => ResearchOutcome::Error {
                error_kind: e.failure_kind(),
                error_detail: e.to_string(),
                session_id: Some(session.id.to_string()),
            },
        };

        ResearchReport {
            outcome,
            session: Some(session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;
    use agent_core::{AgentError, AssistantTurn, Role, ToolCall};
    use crate::search::StaticSearchBackend;
    use crate::tracker::{InjectedFailure, MemoryIssueTracker};

    const TOPIC: &str = "LLM agents function calling";

    fn issue_call(id: &str, title: &str) -> ToolCall {
        ToolCall::new(
            id,
            "create_issue",
            serde_json::json!({
                "repo": "org/repo",
                "title": title,
                "body": format!("Summary of {title}"),
                "labels": ["research"]
            }),
        )
    }

    fn scripted_run() -> Vec<agent_core::Result<AssistantTurn>> {
        vec![
            Ok(AssistantTurn::tool_calls(vec![ToolCall::new(
                "search-1",
                "search",
                serde_json::json!({"query": TOPIC, "max_results": 5}),
            )])),
            Ok(AssistantTurn::tool_calls(vec![
                issue_call("issue-1", "Read: Toolformer"),
                issue_call("issue-2", "Read: ReAct"),
            ])),
            Ok(AssistantTurn::tool_calls(vec![issue_call("issue-3", "Read: Gorilla")])),
            Ok(AssistantTurn::text("Filed 3 issues in org/repo.")),
        ]
    }

    fn desk(
        provider: Arc<ScriptedProvider>,
        search: Arc<StaticSearchBackend>,
        tracker: Arc<MemoryIssueTracker>,
    ) -> ResearchDesk {
        ResearchDesk::new(provider, search, tracker, &ResearchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_three_issues_scenario() {
        let provider = Arc::new(ScriptedProvider::new(scripted_run()));
        let search = Arc::new(StaticSearchBackend::default());
        let tracker = Arc::new(MemoryIssueTracker::new().with_repos(["org/repo"]));
        let desk = desk(provider.clone(), search.clone(), tracker.clone());

        let report = desk
            .run_research(&ResearchRequest::new(TOPIC, "org/repo", 3), CancellationToken::new())
            .await;

        assert!(report.outcome.is_success(), "{:?}", report.outcome);
        assert_eq!(search.queries().await, vec![TOPIC.to_string()]);

        let issues = tracker.issues().await;
        assert_eq!(issues.len(), 3);
        let mut titles: Vec<_> = issues.iter().map(|i| i.title.clone()).collect();
        titles.sort();
        titles.dedup();
        assert_eq!(titles.len(), 3);

        let session = report.session.unwrap();
        assert!(session.conversation().validate().is_ok());
        assert_eq!(session.round_trips(), 4);
        assert_eq!(provider.submissions(), 4);

        // The search results reached the model before it filed issues
        let second_history = &provider.histories().await[1];
        let search_result = second_history.last().unwrap();
        assert_eq!(search_result.role, Role::Tool);
        assert!(search_result.content.contains("Found 5 results"));
    }

    #[tokio::test]
    async fn test_permission_error_on_second_issue() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(AssistantTurn::tool_calls(vec![
                issue_call("issue-1", "Read: Toolformer"),
                issue_call("issue-2", "Read: ReAct"),
                issue_call("issue-3", "Read: Gorilla"),
            ])),
            Ok(AssistantTurn::text("Filed 2 of 3 issues; one was rejected.")),
        ]));
        let tracker = Arc::new(MemoryIssueTracker::new().fail_on_call(2, InjectedFailure::Permission));
        let desk = desk(provider, Arc::new(StaticSearchBackend::default()), tracker.clone());

        let report = desk
            .run_research(&ResearchRequest::new(TOPIC, "org/repo", 3), CancellationToken::new())
            .await;

        assert!(report.outcome.is_success());
        assert_eq!(tracker.attempts().await.len(), 3);
        assert_eq!(tracker.issues().await.len(), 2);

        let session = report.session.unwrap();
        let tool_messages: Vec<_> = session
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 3);
        assert!(tool_messages[0].content.starts_with("Created issue #1"));
        assert!(tool_messages[1].content.starts_with("[Tool 'create_issue' failed]"));
        assert!(tool_messages[1].content.contains("Permission denied"));
        assert!(tool_messages[2].content.starts_with("Created issue #2"));
    }

    #[tokio::test]
    async fn test_issues_outside_target_repo_are_refused() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(AssistantTurn::tool_calls(vec![
                ToolCall::new(
                    "stray",
                    "create_issue",
                    serde_json::json!({"repo": "someone/else", "title": "Read: ReAct", "body": "B"}),
                ),
                issue_call("issue-1", "Read: ReAct"),
            ])),
            Ok(AssistantTurn::text("Filed 1 issue in org/repo.")),
        ]));
        let tracker = Arc::new(MemoryIssueTracker::new());
        let desk = desk(provider, Arc::new(StaticSearchBackend::default()), tracker.clone());

        let report = desk
            .run_research(&ResearchRequest::new(TOPIC, "org/repo", 1), CancellationToken::new())
            .await;

        assert!(report.outcome.is_success());
        assert_eq!(tracker.attempts().await.len(), 1);
        assert_eq!(tracker.issues().await[0].url, "https://github.com/org/repo/issues/1");

        let session = report.session.unwrap();
        let refused = &session.messages()[3];
        assert_eq!(refused.tool_call_id.as_deref(), Some("stray"));
        assert!(refused.content.contains("only create issues in org/repo"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_recovers_after_two_failures() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(AgentError::Transport("connection refused".into())),
            Err(AgentError::Transport("connection refused".into())),
            Ok(AssistantTurn::text("Nothing worth filing.")),
        ]));
        let desk = desk(
            provider.clone(),
            Arc::new(StaticSearchBackend::default()),
            Arc::new(MemoryIssueTracker::new()),
        );

        let report = desk
            .run_research(&ResearchRequest::new(TOPIC, "org/repo", 3), CancellationToken::new())
            .await;

        assert_eq!(provider.submissions(), 3);
        assert!(matches!(
            report.outcome,
            ResearchOutcome::Success { ref final_message, .. } if final_message == "Nothing worth filing."
        ));
    }

    #[tokio::test]
    async fn test_looping_agent_reports_max_iterations() {
        let provider = Arc::new(ScriptedProvider::repeating(AssistantTurn::tool_calls(vec![
            ToolCall::new("s", "search", serde_json::json!({"query": TOPIC})),
        ])));
        let desk = desk(
            provider.clone(),
            Arc::new(StaticSearchBackend::default()),
            Arc::new(MemoryIssueTracker::new()),
        );

        let report = desk
            .run_research(&ResearchRequest::new(TOPIC, "org/repo", 1), CancellationToken::new())
            .await;

        assert_eq!(provider.submissions(), 10);
        match report.outcome {
            ResearchOutcome::Error { error_kind, session_id, .. } => {
                assert_eq!(error_kind, FailureKind::MaxIterationsExceeded);
                assert!(session_id.is_some());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected_without_llm_calls() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let desk = desk(
            provider.clone(),
            Arc::new(StaticSearchBackend::default()),
            Arc::new(MemoryIssueTracker::new()),
        );

        for request in [
            ResearchRequest::new("  ", "org/repo", 3),
            ResearchRequest::new(TOPIC, "not-a-repo", 3),
            ResearchRequest::new(TOPIC, "org/repo", 0),
            ResearchRequest::new(TOPIC, "org/repo", MAX_ISSUE_COUNT + 1),
        ] {
            let report = desk.run_research(&request, CancellationToken::new()).await;
            assert!(report.session.is_none());
            assert!(matches!(
                report.outcome,
                ResearchOutcome::Error { error_kind: FailureKind::InvalidRequest, .. }
            ));
        }
        assert_eq!(provider.submissions(), 0);
    }

    #[test]
    fn test_outcome_wire_format() {
        let success = ResearchOutcome::Success {
            final_message: "done".into(),
            session_id: "s1".into(),
        };
        let json = serde_json::to_value(&success).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["final_message"], "done");

        let error = ResearchOutcome::Error {
            error_kind: FailureKind::LlmTransport,
            error_detail: "down".into(),
            session_id: None,
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_kind"], "llm_transport");
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_task_prompt_mentions_inputs() {
        let request = ResearchRequest::new(TOPIC, "org/repo", 3);
        let prompt = request.task_prompt(&RepoRef::parse("org/repo").unwrap());
        assert!(prompt.contains(TOPIC));
        assert!(prompt.contains("\"org/repo\""));
        assert!(prompt.contains("Pick the 3 most relevant"));
    }
}
