//! Tool System
//!
//! Capabilities the LLM can invoke by name. Tools are registered once at
//! startup; after the registry is shared behind an `Arc` it is read-only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, unique within a run
    #[serde(default)]
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    /// Argument key holding arguments the provider could not decode
    pub const MALFORMED_ARGUMENTS_KEY: &'static str = "__malformed_arguments";

    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        let arguments = match arguments {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// A call whose arguments arrived as undecodable text
    ///
    /// The raw text is kept so the tool result can show the model what it sent.
    pub fn malformed(id: impl Into<String>, name: impl Into<String>, raw: impl Into<String>) -> Self {
        let mut arguments = serde_json::Map::new();
        arguments.insert(
            Self::MALFORMED_ARGUMENTS_KEY.into(),
            serde_json::Value::String(raw.into()),
        );
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Raw argument text, if the provider could not decode it
    pub fn malformed_arguments(&self) -> Option<&str> {
        self.str_arg(Self::MALFORMED_ARGUMENTS_KEY)
    }

    /// String argument lookup
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// Unsigned integer argument lookup, accepting numeric strings
    pub fn u64_arg(&self, key: &str) -> Option<u64> {
        match self.arguments.get(key)? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Per-run values a tool may consult, such as the repository a run may write to
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolContext {
    values: BTreeMap<String, String>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the originating call
    pub tool_call_id: String,

    /// Tool that was called
    pub name: String,

    /// Whether execution failed
    pub is_error: bool,

    /// Output (success text or diagnostic)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(),
            name: name.into(),
            is_error: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(),
            name: name.into(),
            is_error: true,
            output: error.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = id.into();
        self
    }

    /// Text placed in the `tool` message handed back to the LLM
    pub fn to_message_content(&self) -> String {
        let body = self
            .data
            .as_ref()
            .map_or_else(|| self.output.clone(), |data| format!("{}\n{data}", self.output));
        if self.is_error {
            format!("[Tool '{}' failed]\n{body}", self.name)
        } else {
            body
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, integer, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

const fn default_max_concurrency() -> usize {
    1
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,

    /// Maximum concurrent invocations across all sessions
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl ToolSchema {
    /// JSON Schema `parameters` object for native function calling
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), param.param_type.clone().into());
            prop.insert("description".into(), param.description.clone().into());
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), serde_json::Value::Array(values.clone()));
            }
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(param.name.clone(), serde_json::Value::Object(prop));

            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments and the run's context
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult>;

    /// Validate arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !call.arguments.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// A registered capability with its invocation permits
#[derive(Clone)]
pub struct ResolvedTool {
    tool: Arc<dyn Tool>,
    schema: Arc<ToolSchema>,
    permits: Arc<Semaphore>,
}

impl ResolvedTool {
    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    /// Wait for an invocation slot under the tool's concurrency limit
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AgentError::ToolExecution(format!("tool '{}' is shut down", self.schema.name)))
    }

    /// Validate then execute; the caller holds the permit
    pub async fn invoke(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult> {
        if let Some(raw) = call.malformed_arguments() {
            return Err(AgentError::ToolValidation(format!(
                "arguments are not valid JSON, resend them as a JSON object: {raw}"
            )));
        }
        self.tool.validate(call)?;
        self.tool.execute(call, ctx).await
    }
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ResolvedTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let schema = tool.schema();
        if self.tools.contains_key(&schema.name) {
            return Err(AgentError::DuplicateTool(schema.name));
        }

        let permits = Arc::new(Semaphore::new(schema.max_concurrency.max(1)));
        tracing::debug!(
            tool = %schema.name,
            max_concurrency = schema.max_concurrency.max(1),
            "Registered tool"
        );
        self.tools.insert(
            schema.name.clone(),
            ResolvedTool {
                tool,
                schema: Arc::new(schema),
                permits,
            },
        );
        Ok(())
    }

    /// Look up a tool by name
    pub fn resolve(&self, name: &str) -> Result<ResolvedTool> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    /// Get all tool schemas (sorted by name)
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema().clone()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
