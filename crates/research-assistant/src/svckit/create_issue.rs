//! Create Issue Tool
//!
//! Files one issue in the target repository. Has side effects, so the
//! registry allows a single invocation at a time, and a run that names its
//! repository in the tool context cannot file anywhere else.

use std::sync::Arc;

use async_trait::async_trait;

use agent_core::{
    AgentError, ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolContext, ToolResult,
    ToolSchema,
};

use crate::model::{NewIssue, RepoRef};
use crate::tracker::IssueTracker;

/// Tool for creating tracker issues
pub struct CreateIssueTool {
    tracker: Arc<dyn IssueTracker>,
}

impl CreateIssueTool {
    pub const NAME: &'static str = "create_issue";

    /// Tool-context key naming the only repository a run may file into
    pub const ALLOWED_REPO: &'static str = "allowed_repo";

    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }

    /// Accepts a JSON array of strings or a comma-separated string
    fn labels(call: &ToolCall) -> Vec<String> {
        match call.arguments.get("labels") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(serde_json::Value::String(s)) => s
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn required_text<'a>(call: &'a ToolCall, key: &str) -> CoreResult<&'a str> {
        call.str_arg(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AgentError::ToolValidation(format!("{key} must be a non-empty string")))
    }

    fn check_allowed(repo: &RepoRef, ctx: &ToolContext) -> CoreResult<()> {
        let Some(allowed) = ctx.get(Self::ALLOWED_REPO) else {
            return Ok(());
        };
        let allowed = RepoRef::parse(allowed)
            .map_err(|e| AgentError::Config(format!("invalid {}: {e}", Self::ALLOWED_REPO)))?;
        if repo.matches(&allowed) {
            Ok(())
        } else {
            Err(AgentError::ToolValidation(format!(
                "this run may only create issues in {allowed}, not {repo}"
            )))
        }
    }
}

#[async_trait]
impl Tool for CreateIssueTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: Self::NAME.into(),
            description: "Create an issue in a GitHub repository. Returns the issue number and URL.".into(),
            parameters: vec![
                ParameterSchema::required("repo", "string", "Target repository as 'owner/name'"),
                ParameterSchema::required("title", "string", "Issue title"),
                ParameterSchema::required("body", "string", "Issue body in Markdown"),
                ParameterSchema::optional("labels", "array", "Labels to apply"),
                ParameterSchema::optional("assignee", "string", "GitHub username to assign"),
            ],
            category: Some("issue_tracker".into()),
            has_side_effects: true,
            max_concurrency: 1,
        }
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> CoreResult<ToolResult> {
        let repo = RepoRef::parse(Self::required_text(call, "repo")?)?;
        Self::check_allowed(&repo, ctx)?;
        let issue = NewIssue {
            repo,
            title: Self::required_text(call, "title")?.to_string(),
            body: Self::required_text(call, "body")?.to_string(),
            labels: Self::labels(call),
            assignee: call
                .str_arg("assignee")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
        };

        let created = self.tracker.create_issue(&issue).await?;
        tracing::info!(
            tracker = self.tracker.name(),
            repo = %issue.repo,
            issue_id = created.issue_id,
            "Issue created"
        );

        Ok(ToolResult::success(
            Self::NAME,
            format!(
                "Created issue #{} in {}: {}",
                created.issue_id, issue.repo, created.url
            ),
        )
        .with_data(serde_json::json!({
            "issue_id": created.issue_id,
            "url": created.url,
        })))
    }
}
