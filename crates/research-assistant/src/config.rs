//! Configuration
//!
//! Everything is read once at startup and injected into the backends and the
//! run controller; nothing below reads the environment on its own.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{GenerationOptions, RetryPolicy, RunConfig};

use crate::error::{ResearchError, Result};
use crate::search::{SearchBackend, SemanticScholarConfig, SemanticScholarSearch, StaticSearchBackend};
use crate::tracker::{GithubConfig, GithubIssueTracker, IssueTracker, MemoryIssueTracker};

/// Which issue tracker to file into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueBackend {
    Github,
    /// Dry run: keep issues in memory
    Memory,
}

impl FromStr for IssueBackend {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "memory" => Ok(Self::Memory),
            other => Err(ResearchError::Config(format!("unknown issue backend '{other}'"))),
        }
    }
}

/// Which search service to query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchBackendKind {
    SemanticScholar,
    /// Canned demo results
    Static,
}

impl FromStr for SearchBackendKind {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "semantic_scholar" | "semanticscholar" => Ok(Self::SemanticScholar),
            "static" => Ok(Self::Static),
            other => Err(ResearchError::Config(format!("unknown search backend '{other}'"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResearchConfig {
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub semantic_scholar_api_key: Option<String>,
    pub semantic_scholar_api_url: String,
    pub max_iterations: usize,
    pub llm_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub llm_max_attempts: u32,
    pub issue_backend: IssueBackend,
    pub search_backend: SearchBackendKind,
    /// Model name passed to the LLM provider; provider default when unset
    pub model: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_url: "https://api.github.com".into(),
            semantic_scholar_api_key: None,
            semantic_scholar_api_url: SemanticScholarConfig::default().api_url,
            max_iterations: 10,
            llm_timeout_secs: 120,
            tool_timeout_secs: 60,
            llm_max_attempts: 3,
            issue_backend: IssueBackend::Github,
            search_backend: SearchBackendKind::SemanticScholar,
            model: None,
        }
    }
}

/// Parse `key` or fall back to `default`, warning on garbage
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
    }
}

impl ResearchConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test map, ...)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            github_token: non_empty("GITHUB_TOKEN"),
            github_api_url: non_empty("GITHUB_API_URL").unwrap_or(defaults.github_api_url),
            semantic_scholar_api_key: non_empty("SEMANTIC_SCHOLAR_API_KEY"),
            semantic_scholar_api_url: non_empty("SEMANTIC_SCHOLAR_API_URL")
                .unwrap_or(defaults.semantic_scholar_api_url),
            max_iterations: parse_or(&lookup, "RESEARCH_MAX_ITERATIONS", defaults.max_iterations),
            llm_timeout_secs: parse_or(&lookup, "RESEARCH_LLM_TIMEOUT_SECS", defaults.llm_timeout_secs),
            tool_timeout_secs: parse_or(&lookup, "RESEARCH_TOOL_TIMEOUT_SECS", defaults.tool_timeout_secs),
            llm_max_attempts: parse_or(&lookup, "RESEARCH_LLM_MAX_ATTEMPTS", defaults.llm_max_attempts),
            issue_backend: parse_or(&lookup, "RESEARCH_ISSUE_BACKEND", defaults.issue_backend),
            search_backend: parse_or(&lookup, "RESEARCH_SEARCH_BACKEND", defaults.search_backend),
            model: non_empty("OLLAMA_MODEL"),
        }
    }

    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Run controller settings (persona is set by the caller)
    pub fn run_config(&self) -> RunConfig {
        let mut generation = GenerationOptions::default();
        if let Some(model) = &self.model {
            generation.model.clone_from(model);
        }
        RunConfig {
            generation,
            max_iterations: self.max_iterations,
            llm_timeout: Duration::from_secs(self.llm_timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.llm_max_attempts.max(1),
                ..RetryPolicy::default()
            },
            ..RunConfig::default()
        }
    }

    pub fn build_search_backend(&self) -> Result<Arc<dyn SearchBackend>> {
        Ok(match self.search_backend {
            SearchBackendKind::Static => Arc::new(StaticSearchBackend::default()),
            SearchBackendKind::SemanticScholar => {
                Arc::new(SemanticScholarSearch::new(SemanticScholarConfig {
                    api_url: self.semantic_scholar_api_url.clone(),
                    api_key: self.semantic_scholar_api_key.clone(),
                    ..SemanticScholarConfig::default()
                })?)
            }
        })
    }

    pub fn build_issue_tracker(&self) -> Result<Arc<dyn IssueTracker>> {
        Ok(match self.issue_backend {
            IssueBackend::Memory => Arc::new(MemoryIssueTracker::new()),
            IssueBackend::Github => {
                let token = self.github_token.clone().ok_or_else(|| {
                    ResearchError::Config(
                        "GITHUB_TOKEN is required when RESEARCH_ISSUE_BACKEND=github".into(),
                    )
                })?;
                Arc::new(GithubIssueTracker::new(GithubConfig {
                    api_url: self.github_api_url.clone(),
                    ..GithubConfig::new(token)
                })?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ResearchConfig::from_lookup(|_| None);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.llm_max_attempts, 3);
        assert_eq!(config.issue_backend, IssueBackend::Github);
        assert!(config.github_token.is_none());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = ResearchConfig::from_lookup(lookup(&[
            ("RESEARCH_MAX_ITERATIONS", "4"),
            ("RESEARCH_LLM_TIMEOUT_SECS", "soon"),
            ("RESEARCH_ISSUE_BACKEND", "Memory"),
            ("RESEARCH_SEARCH_BACKEND", "static"),
            ("GITHUB_TOKEN", "   "),
            ("OLLAMA_MODEL", "qwen2.5"),
        ]));

        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.llm_timeout_secs, 120);
        assert_eq!(config.issue_backend, IssueBackend::Memory);
        assert_eq!(config.search_backend, SearchBackendKind::Static);
        assert!(config.github_token.is_none());

        let run = config.run_config();
        assert_eq!(run.max_iterations, 4);
        assert_eq!(run.retry.max_attempts, 3);
        assert_eq!(run.generation.model, "qwen2.5");
    }

    #[test]
    fn test_github_backend_requires_token() {
        let config = ResearchConfig::default();
        assert!(matches!(
            config.build_issue_tracker(),
            Err(ResearchError::Config(_))
        ));

        let dry_run = ResearchConfig {
            issue_backend: IssueBackend::Memory,
            ..ResearchConfig::default()
        };
        assert!(dry_run.build_issue_tracker().is_ok());
    }
}
