//! Service Kit - Agent Tools
//!
//! Domain tools that implement `agent_core::Tool` for the research agent.

mod create_issue;
mod search;

pub use create_issue::CreateIssueTool;
pub use search::SearchTool;
