//! Domain Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};

/// One search result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub summary: String,
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            url: url.into(),
            year: None,
            authors: Vec::new(),
        }
    }
}

/// `owner/name` repository reference
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(ResearchError::InvalidArgument(format!(
                "repository must look like 'owner/name', got '{s}'"
            ))),
        }
    }
}

impl RepoRef {
    /// Same repository; GitHub owner and repository names are case-insensitive
    pub fn matches(&self, other: &Self) -> bool {
        self.owner.eq_ignore_ascii_case(&other.owner) && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Issue to be filed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewIssue {
    pub repo: RepoRef,
    pub title: String,
    pub body: String,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub assignee: Option<String>,
}

/// Issue as created by the tracker
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub issue_id: u64,
    pub url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}
