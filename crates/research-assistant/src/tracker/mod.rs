//! Issue Tracker Integration
//!
//! Abstractions and implementations for filing issues.

mod github;
mod memory;

pub use github::{GithubConfig, GithubIssueTracker};
pub use memory::{InjectedFailure, MemoryIssueTracker};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{CreatedIssue, NewIssue};

/// Issue tracker trait (Strategy pattern)
///
/// Fails with `ResearchError::NotFound` for an unknown repository and
/// `ResearchError::Permission` when the credentials may not file issues.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue>;

    /// Tracker name
    fn name(&self) -> &str;
}
