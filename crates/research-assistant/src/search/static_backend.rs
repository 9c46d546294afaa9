//! Static Search Backend
//!
//! For testing and demo purposes. Returns a fixed list of papers.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::SearchBackend;
use crate::error::Result;
use crate::model::SearchHit;

/// Search backend with canned results
pub struct StaticSearchBackend {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl Default for StaticSearchBackend {
    fn default() -> Self {
        Self::new(vec![
            SearchHit::new(
                "Toolformer: Language Models Can Teach Themselves to Use Tools",
                "Self-supervised training that lets a language model decide which APIs to call, when, and with which arguments.",
                "https://arxiv.org/abs/2302.04761",
            ),
            SearchHit::new(
                "ReAct: Synergizing Reasoning and Acting in Language Models",
                "Interleaves reasoning traces with task-specific actions so the model can consult external sources while it plans.",
                "https://arxiv.org/abs/2210.03629",
            ),
            SearchHit::new(
                "Gorilla: Large Language Model Connected with Massive APIs",
                "A fine-tuned model that writes accurate API calls and reduces hallucinated arguments using retrieval.",
                "https://arxiv.org/abs/2305.15334",
            ),
            SearchHit::new(
                "ToolLLM: Facilitating Large Language Models to Master 16000+ Real-world APIs",
                "Instruction-tuning dataset and depth-first search decision tree for multi-step tool use.",
                "https://arxiv.org/abs/2307.16789",
            ),
            SearchHit::new(
                "An LLM Compiler for Parallel Function Calling",
                "Plans function calls as a DAG and executes independent calls in parallel to cut latency and cost.",
                "https://arxiv.org/abs/2312.04511",
            ),
        ])
    }
}

impl StaticSearchBackend {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far
    pub async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl SearchBackend for StaticSearchBackend {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().await.push(query.to_string());
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        "StaticSearch"
    }
}
