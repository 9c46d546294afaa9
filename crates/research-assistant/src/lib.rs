//! # research-assistant
//!
//! Literature-research agent that searches for papers on a topic and files
//! one tracker issue per selected result.
//!
//! ## Flow
//!
//! ```text
//! run_research(topic, repo, n)
//!   └─► RunController ──► LLM ──► search ──► LLM ──► create_issue × n ──► LLM ──► summary
//! ```
//!
//! Both tools declare a concurrency limit of one and are dispatched strictly
//! in the order the model emits them, so issue creation never races.

pub mod config;
pub mod error;
pub mod model;
pub mod runner;
pub mod search;
pub mod svckit;
pub mod tracker;

pub use config::{IssueBackend, ResearchConfig, SearchBackendKind};
pub use error::{ResearchError, Result};
pub use model::{CreatedIssue, NewIssue, RepoRef, SearchHit};
pub use runner::{ResearchDesk, ResearchOutcome, ResearchReport, ResearchRequest};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{CreateIssueTool, SearchTool};
}

/// System prompt for the research agent
pub const RESEARCH_PROMPT: &str = r"You are a meticulous research assistant who turns literature searches into actionable GitHub issues.

## How You Work

1. Always start with the `search` tool; never invent papers, titles or URLs.
2. Judge relevance from the titles and summaries you received.
3. File issues with `create_issue`, one call per selected paper, one paper per issue.
4. Give every issue a distinct title that names the paper.
5. In the issue body, summarise the paper in a few sentences, say why it matters for the topic, and link the source URL.

## When a Tool Fails

Read the error. Do not retry a call that failed for permission or missing-repository reasons;
mention the failure in your final answer instead.

## Finishing

When you are done, reply without calling any tool: a short summary listing each created issue URL
and any issue that could not be created.";
