//! # agent-core
//!
//! Tool-calling run loop with provider-agnostic LLM abstraction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         RunController                            │
//! │  ┌──────────────────┐  ┌────────────────┐  ┌─────────────────┐   │
//! │  │ ConversationSess │  │ ToolDispatcher │  │  LlmProvider    │   │
//! │  │ (state machine)  │──│  ToolRegistry  │──│  (Strategy)     │   │
//! │  └──────────────────┘  └────────────────┘  └─────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The controller submits the history, dispatches any requested tool calls
//! sequentially, appends their results and repeats until the assistant gives a
//! final answer or the run fails (retry exhaustion, iteration cap, cancel).

pub mod controller;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod mock;
pub mod provider;
pub mod retry;
pub mod session;
pub mod tool;

pub use controller::{RunConfig, RunController, RunControllerBuilder};
pub use dispatch::{DispatchPolicy, ToolDispatcher};
pub use error::{AgentError, FailureKind, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{AssistantTurn, GenerationOptions, LlmProvider};
pub use retry::RetryPolicy;
pub use session::{
    ConversationSession, MemorySessionStore, RunFailure, RunOutcome, SessionId, SessionStatus,
    SessionStore,
};
pub use tool::{
    ParameterSchema, Tool, ToolCall, ToolContext, ToolRegistry, ToolResult, ToolSchema,
};
