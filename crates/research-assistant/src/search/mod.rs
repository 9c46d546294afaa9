//! Literature Search
//!
//! Abstractions and implementations for paper/web search services.

mod semantic_scholar;
mod static_backend;

pub use semantic_scholar::{SemanticScholarConfig, SemanticScholarSearch};
pub use static_backend::StaticSearchBackend;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::SearchHit;

/// Search backend trait (Strategy pattern)
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Search for `query`, returning at most `max_results` hits
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Backend name
    fn name(&self) -> &str;
}
