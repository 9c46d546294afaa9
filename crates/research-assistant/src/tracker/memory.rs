//! In-memory issue tracker
//!
//! For tests and dry runs. Keeps created issues in memory and can be told to
//! fail specific invocations.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::IssueTracker;
use crate::error::{ResearchError, Result};
use crate::model::{CreatedIssue, NewIssue};

/// Failure to raise on a given invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InjectedFailure {
    NotFound,
    Permission,
}

#[derive(Default)]
struct State {
    attempts: Vec<NewIssue>,
    created: Vec<CreatedIssue>,
}

#[derive(Default)]
pub struct MemoryIssueTracker {
    /// Repositories that exist; empty means every repository exists
    repos: HashSet<String>,
    /// 1-based invocation number -> failure
    failures: HashMap<usize, InjectedFailure>,
    state: Mutex<State>,
}

impl MemoryIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only these repositories exist
    #[must_use]
    pub fn with_repos<I, S>(mut self, repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.repos = repos.into_iter().map(Into::into).collect();
        self
    }

    /// Fail the `n`th invocation (1-based)
    #[must_use]
    pub fn fail_on_call(mut self, n: usize, failure: InjectedFailure) -> Self {
        self.failures.insert(n, failure);
        self
    }

    /// Every invocation received, failed ones included
    pub async fn attempts(&self) -> Vec<NewIssue> {
        self.state.lock().await.attempts.clone()
    }

    /// Issues successfully created
    pub async fn issues(&self) -> Vec<CreatedIssue> {
        self.state.lock().await.created.clone()
    }
}

#[async_trait]
impl IssueTracker for MemoryIssueTracker {
    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue> {
        let mut state = self.state.lock().await;
        state.attempts.push(issue.clone());
        let call_number = state.attempts.len();
        let repo = issue.repo.to_string();

        match self.failures.get(&call_number) {
            Some(InjectedFailure::NotFound) => return Err(ResearchError::NotFound(repo)),
            Some(InjectedFailure::Permission) => {
                return Err(ResearchError::Permission(format!(
                    "token may not create issues in {repo}"
                )));
            }
            None => {}
        }
        if !self.repos.is_empty() && !self.repos.contains(&repo) {
            return Err(ResearchError::NotFound(repo));
        }

        let issue_id = state.created.len() as u64 + 1;
        let created = CreatedIssue {
            issue_id,
            url: format!("https://github.com/{repo}/issues/{issue_id}"),
            title: issue.title.clone(),
            created_at: Utc::now(),
        };
        state.created.push(created.clone());
        Ok(created)
    }

    fn name(&self) -> &str {
        "MemoryTracker"
    }
}
