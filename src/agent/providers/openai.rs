//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Compatible with any `OpenAI`-style chat API via the base URL override
//! in [`ServiceConfig`]. The mapping is deliberately thin: messages wire
//! through a `From` impl, the tool catalog and response fold through small
//! helpers, and the configured per-call timeout wraps every request.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionResponse, FunctionCall, FunctionObject, ResponseFormat,
};
use async_trait::async_trait;

use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::agent::tool::{ToolCall, ToolDefinition};
use crate::config::ServiceConfig;
use crate::error::LlmError;

/// `OpenAI`-compatible LLM provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Creates a new provider from service configuration.
    #[must_use]
    pub fn new(config: &ServiceConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
            timeout: config.completion_timeout,
        }
    }
}

impl From<&ChatMessage> for ChatCompletionRequestMessage {
    fn from(msg: &ChatMessage) -> Self {
        let text = msg.content.clone();
        match msg.role {
            Role::System => Self::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(text),
                name: None,
            }),
            Role::User => Self::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(text),
                name: None,
            }),
            Role::Assistant => Self::Assistant(wire_assistant(msg)),
            Role::Tool => Self::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(text),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        }
    }
}

/// Wires an assistant turn; empty text and an empty call list both map to
/// `None` so the host API does not reject the turn.
fn wire_assistant(msg: &ChatMessage) -> ChatCompletionRequestAssistantMessage {
    let tool_calls = (!msg.tool_calls.is_empty())
        .then(|| msg.tool_calls.iter().map(wire_tool_call).collect());
    let content = (!msg.content.is_empty())
        .then(|| ChatCompletionRequestAssistantMessageContent::Text(msg.content.clone()));

    #[allow(deprecated)]
    ChatCompletionRequestAssistantMessage {
        content,
        name: None,
        tool_calls,
        refusal: None,
        audio: None,
        function_call: None,
    }
}

fn wire_tool_call(call: &ToolCall) -> ChatCompletionMessageToolCall {
    ChatCompletionMessageToolCall {
        id: call.id.clone(),
        r#type: ChatCompletionToolType::Function,
        function: FunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        },
    }
}

fn wire_tool(def: &ToolDefinition) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: def.name.clone(),
            description: Some(def.description.clone()),
            parameters: Some(def.parameters.clone()),
            strict: None,
        },
    }
}

/// Folds the SDK response into the provider-agnostic shape, taking the
/// first choice (the request never asks for more than one).
fn fold_response(response: CreateChatCompletionResponse) -> ChatResponse {
    let usage = response
        .usage
        .map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

    let Some(choice) = response.choices.into_iter().next() else {
        return ChatResponse {
            content: String::new(),
            usage,
            tool_calls: Vec::new(),
            finish_reason: None,
        };
    };

    ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        tool_calls: choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect(),
        finish_reason: choice
            .finish_reason
            .map(|fr| format!("{fr:?}").to_lowercase()),
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let wire = CreateChatCompletionRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(ChatCompletionRequestMessage::from)
                .collect(),
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat::JsonObject),
            tools: (!request.tools.is_empty())
                .then(|| request.tools.iter().map(wire_tool).collect()),
            ..Default::default()
        };

        let chat = self.client.chat();
        let call = chat.create(wire);
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LlmError::Timeout {
                budget_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| LlmError::Upstream {
                message: e.to_string(),
                status: None,
            })?;

        Ok(fold_response(response))
    }
}
