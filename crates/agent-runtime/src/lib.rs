//! # agent-runtime
//!
//! Runtime providers for the research agent.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama's `/api/chat`,
//!   using its native tool-calling support
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::ollama::OllamaProvider;
//!
//! let provider = OllamaProvider::from_env()?;
//! let controller = RunControllerBuilder::new()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use agent_core::{
    AgentError, AssistantTurn, LlmProvider, Message, Result, Role, RunController, Tool,
    ToolRegistry,
};
