//! GitHub Issues via the REST API

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::IssueTracker;
use crate::error::{ResearchError, Result};
use crate::model::{CreatedIssue, NewIssue};

#[derive(Clone, Debug)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: String,
    pub timeout_secs: u64,
}

impl GithubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: "https://api.github.com".into(),
            token: token.into(),
            timeout_secs: 30,
        }
    }
}

pub struct GithubIssueTracker {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubIssueTracker {
    pub fn new(config: GithubConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(ResearchError::Config("GitHub token is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("research-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn classify_status(status: StatusCode, repo: &str, message: String) -> ResearchError {
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => ResearchError::NotFound(repo.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ResearchError::Permission(format!("{repo}: {message}"))
            }
            StatusCode::TOO_MANY_REQUESTS => ResearchError::RateLimited("GitHub".into()),
            StatusCode::UNPROCESSABLE_ENTITY => ResearchError::InvalidArgument(message),
            _ => ResearchError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl IssueTracker for GithubIssueTracker {
    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue> {
        let url = format!(
            "{}/repos/{}/{}/issues",
            self.config.api_url.trim_end_matches('/'),
            issue.repo.owner,
            issue.repo.name
        );
        let payload = CreateIssueRequest {
            title: &issue.title,
            body: &issue.body,
            labels: &issue.labels,
            assignees: issue.assignee.iter().map(String::as_str).collect(),
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &issue.repo.to_string(), message));
        }

        let created: CreateIssueResponse = response.json().await?;
        tracing::info!(repo = %issue.repo, number = created.number, "Created GitHub issue");

        Ok(CreatedIssue {
            issue_id: created.number,
            url: created.html_url,
            title: created.title,
            created_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "GitHub"
    }
}

#[derive(Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "is_empty_slice")]
    labels: &'a [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    assignees: Vec<&'a str>,
}

fn is_empty_slice(labels: &&[String]) -> bool {
    labels.is_empty()
}

#[derive(Debug, Deserialize)]
struct CreateIssueResponse {
    number: u64,
    html_url: String,
    title: String,
}
