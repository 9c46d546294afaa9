//! Semantic Scholar paper search
//!
//! Uses the Graph API `paper/search` endpoint, which returns JSON and works
//! without a key at a lower rate limit.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::SearchBackend;
use crate::error::{ResearchError, Result};
use crate::model::SearchHit;

const FIELDS: &str = "title,abstract,url,year,authors";
const MAX_SUMMARY_CHARS: usize = 600;

#[derive(Clone, Debug)]
pub struct SemanticScholarConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SemanticScholarConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.semanticscholar.org".into(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Semantic Scholar search client
pub struct SemanticScholarSearch {
    client: reqwest::Client,
    config: SemanticScholarConfig,
}

impl SemanticScholarSearch {
    pub fn new(config: SemanticScholarConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn convert(paper: Paper) -> Option<SearchHit> {
        let title = paper.title?.trim().to_string();
        if title.is_empty() {
            return None;
        }

        let summary = paper
            .abstract_text
            .map(|a| truncate(a.trim(), MAX_SUMMARY_CHARS))
            .unwrap_or_default();
        let url = paper.url.unwrap_or_else(|| {
            format!("https://www.semanticscholar.org/paper/{}", paper.paper_id)
        });

        Some(SearchHit {
            title,
            summary,
            url,
            year: paper.year,
            authors: paper.authors.into_iter().filter_map(|a| a.name).collect(),
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[async_trait]
impl SearchBackend for SemanticScholarSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = format!(
            "{}/graph/v1/paper/search",
            self.config.api_url.trim_end_matches('/')
        );
        let limit = max_results.clamp(1, 100).to_string();

        let mut request = self
            .client
            .get(url)
            .query(&[("query", query), ("limit", limit.as_str()), ("fields", FIELDS)]);
        if let Some(key) = &self.config.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ResearchError::RateLimited("Semantic Scholar".into()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ResearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = response.json().await?;
        tracing::debug!(query, total = body.total, "Semantic Scholar search");

        Ok(body
            .data
            .into_iter()
            .filter_map(Self::convert)
            .take(max_results)
            .collect())
    }

    fn name(&self) -> &str {
        "SemanticScholar"
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    #[serde(default)]
    paper_id: String,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    url: Option<String>,
    year: Option<u16>,
    #[serde(default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
}
