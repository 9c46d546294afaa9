//! Search Tool
//!
//! Finds papers or web pages for a query.

use std::sync::Arc;

use async_trait::async_trait;

use agent_core::{
    AgentError, ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolContext, ToolResult,
    ToolSchema,
};

use crate::search::SearchBackend;

const DEFAULT_MAX_RESULTS: u64 = 5;
const MAX_RESULTS_CAP: u64 = 20;

/// Tool for searching the literature
pub struct SearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl SearchTool {
    pub const NAME: &'static str = "search";

    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: Self::NAME.into(),
            description: "Search academic papers and web sources. Returns title, summary and URL for each result.".into(),
            parameters: vec![
                ParameterSchema::required("query", "string", "Search query, e.g. 'LLM agents function calling'"),
                ParameterSchema::optional("max_results", "integer", "Maximum number of results (1-20)")
                    .with_default(serde_json::json!(DEFAULT_MAX_RESULTS)),
            ],
            category: Some("research".into()),
            has_side_effects: false,
            max_concurrency: 1,
        }
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> CoreResult<ToolResult> {
        let query = call
            .str_arg("query")
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AgentError::ToolValidation("query must be a non-empty string".into()))?;

        let max_results = call
            .u64_arg("max_results")
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CAP);
        let limit = usize::try_from(max_results).unwrap_or(1);

        let hits = self.backend.search(query, limit).await?;
        tracing::debug!(backend = self.backend.name(), query, hits = hits.len(), "Search finished");

        if hits.is_empty() {
            return Ok(ToolResult::success(
                Self::NAME,
                format!("No results for '{query}'."),
            ));
        }

        let mut output = format!("Found {} results for '{query}':\n", hits.len());
        for (i, hit) in hits.iter().enumerate() {
            output.push_str(&format!("{}. {}\n   {}\n", i + 1, hit.title, hit.url));
            if !hit.summary.is_empty() {
                output.push_str(&format!("   {}\n", hit.summary));
            }
        }

        Ok(ToolResult::success(Self::NAME, output.trim_end()).with_data(serde_json::to_value(&hits)?))
    }
}
