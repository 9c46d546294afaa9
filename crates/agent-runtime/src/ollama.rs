//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference. Talks to
//! `/api/chat` directly so tool definitions and tool calls travel in Ollama's
//! native function-calling format.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{AssistantTurn, FinishReason, GenerationOptions, LlmProvider, TokenUsage},
    tool::{ToolCall, ToolSchema},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Default model
    pub model: String,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test map, ...)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("OLLAMA_HOST").unwrap_or(defaults.host),
            port: lookup("OLLAMA_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            model: lookup("OLLAMA_MODEL").unwrap_or(defaults.model),
            timeout_secs: lookup("OLLAMA_TIMEOUT_SECS")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OllamaConfig::from_env())
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Convert agent messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|c| WireToolCall {
                        function: WireFunction {
                            name: c.name.clone(),
                            arguments: serde_json::Value::Object(c.arguments.clone()),
                        },
                    })
                    .collect(),
                tool_name: match m.role {
                    Role::Tool => m.name.clone(),
                    _ => None,
                },
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolSchema]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|t| WireTool {
                kind: "function",
                function: WireToolDef {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.to_json_schema(),
                },
            })
            .collect()
    }

    /// Convert one wire call; Ollama does not assign call IDs, the controller does
    fn convert_tool_call(call: WireToolCall) -> ToolCall {
        let WireFunction { name, arguments } = call.function;
        match arguments {
            // Some models double-encode arguments as a JSON string
            serde_json::Value::String(raw) => match serde_json::from_str(&raw) {
                Ok(arguments) => ToolCall::new(String::new(), name, arguments),
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "Undecodable tool call arguments");
                    ToolCall::malformed(String::new(), name, raw)
                }
            },
            other => ToolCall::new(String::new(), name, other),
        }
    }

    /// Convert Ollama response to an assistant turn
    fn convert_response(response: ChatResponse) -> AssistantTurn {
        let tool_calls: Vec<ToolCall> = response
            .message
            .tool_calls
            .into_iter()
            .map(Self::convert_tool_call)
            .collect();

        let finish_reason = if tool_calls.is_empty() {
            match response.done_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            }
        } else {
            FinishReason::ToolUse
        };

        let usage = match (response.prompt_eval_count, response.eval_count) {
            (None, None) => None,
            (prompt, completion) => {
                let prompt_tokens = prompt.unwrap_or(0);
                let completion_tokens = completion.unwrap_or(0);
                Some(TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens.saturating_add(completion_tokens),
                })
            }
        };

        let content = response.message.content;
        AssistantTurn {
            content: (!content.is_empty()).then_some(content),
            tool_calls,
            model: Some(response.model),
            usage,
            finish_reason: Some(finish_reason),
        }
    }

    /// Map an HTTP error status to the controller's retry taxonomy
    fn classify_status(status: StatusCode, body: &str) -> AgentError {
        let detail = format!("Ollama returned {status}: {body}");
        if status == StatusCode::TOO_MANY_REQUESTS {
            AgentError::RateLimited(detail)
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            AgentError::Transport(detail)
        } else {
            AgentError::InvalidRequest(detail)
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url());
        match self.client.get(url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn submit(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<AssistantTurn> {
        let request = ChatRequest {
            model: &options.model,
            messages: Self::convert_messages(messages),
            tools: Self::convert_tools(tools),
            stream: false,
            options: WireOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.config.base_url());
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Transport(format!("malformed Ollama response: {e}")))?;

        Ok(Self::convert_response(body))
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
    options: WireOptions,
}

#[derive(Serialize)]
struct WireOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolDef,
}

#[derive(Serialize)]
struct WireToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    message: WireMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::ParameterSchema;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("OLLAMA_HOST", "http://gpu-box/"),
            ("OLLAMA_PORT", "not-a-port"),
            ("OLLAMA_MODEL", "qwen2.5"),
        ]
        .into_iter()
        .collect();

        let config = OllamaConfig::from_lookup(|k| vars.get(k).map(ToString::to_string));
        assert_eq!(config.base_url(), "http://gpu-box:11434");
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_message_conversion() {
        let call = ToolCall::new("c1", "search", serde_json::json!({"query": "agents"}));
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool("3 results", "c1", "search"),
        ];

        let converted = OllamaProvider::convert_messages(&messages);
        assert_eq!(converted.len(), 4);
        assert_eq!(converted[2].tool_calls[0].function.name, "search");
        assert_eq!(converted[2].tool_calls[0].function.arguments["query"], "agents");
        assert_eq!(converted[3].role, "tool");
        assert_eq!(converted[3].tool_name.as_deref(), Some("search"));
        assert!(converted[1].tool_name.is_none());
    }

    #[test]
    fn test_tool_conversion() {
        let schema = ToolSchema {
            name: "search".into(),
            description: "Search papers".into(),
            parameters: vec![ParameterSchema::required("query", "string", "Query")],
            category: None,
            has_side_effects: false,
            max_concurrency: 1,
        };

        let tools = serde_json::to_value(OllamaProvider::convert_tools(&[schema])).unwrap();
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "search");
        assert_eq!(tools[0]["function"]["parameters"]["required"][0], "query");
    }

    #[test]
    fn test_response_with_tool_calls() {
        let raw = serde_json::json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "search", "arguments": {"query": "agents"}}},
                    {"function": {"name": "create_issue", "arguments": "{\"title\": \"T\"}"}}
                ]
            },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 10,
            "eval_count": 5
        });

        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let turn = OllamaProvider::convert_response(response);

        assert!(turn.content.is_none());
        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[1].str_arg("title"), Some("T"));
        assert_eq!(turn.finish_reason, Some(FinishReason::ToolUse));
        assert_eq!(turn.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_response_with_text() {
        let raw = serde_json::json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "Filed 3 issues."},
            "done_reason": "length"
        });

        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let turn = OllamaProvider::convert_response(response);

        assert_eq!(turn.trimmed_content(), "Filed 3 issues.");
        assert_eq!(turn.finish_reason, Some(FinishReason::Length));
        assert!(turn.usage.is_none());
    }

    #[test]
    fn test_undecodable_arguments_keep_the_call() {
        let raw = serde_json::json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "search", "arguments": "{\"query\": \"agents\""}},
                    {"function": {"name": "search", "arguments": {"query": "tool use"}}}
                ]
            }
        });

        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let turn = OllamaProvider::convert_response(response);

        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[0].name, "search");
        assert_eq!(
            turn.tool_calls[0].malformed_arguments(),
            Some("{\"query\": \"agents\"")
        );
        assert_eq!(turn.tool_calls[1].str_arg("query"), Some("tool use"));
        assert!(turn.tool_calls[1].malformed_arguments().is_none());
    }

    #[test]
    fn test_usage_total_saturates() {
        let raw = serde_json::json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "ok"},
            "prompt_eval_count": u32::MAX,
            "eval_count": 7
        });

        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let usage = OllamaProvider::convert_response(response).usage.unwrap();

        assert_eq!(usage.total_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, 7);
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            OllamaProvider::classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            AgentError::RateLimited(_)
        ));
        assert!(matches!(
            OllamaProvider::classify_status(StatusCode::BAD_GATEWAY, ""),
            AgentError::Transport(_)
        ));
        assert!(matches!(
            OllamaProvider::classify_status(StatusCode::NOT_FOUND, "model not found"),
            AgentError::InvalidRequest(_)
        ));
    }
}
