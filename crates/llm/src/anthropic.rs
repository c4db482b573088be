use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stride_common::{CoachError, Result};

use crate::client::{
    LlmClient, LlmRequest, LlmResponse, Role, TokenUsage, check_status, transport_error,
};

pub(crate) const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub(crate) const SERVICE: &str = "anthropic";

#[derive(Serialize, Debug)]
pub(crate) struct MessagesRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct WireMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl WireMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// Block kinds this crate does not interpret.
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Debug, Clone)]
pub(crate) struct WireTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Deserialize, Debug)]
pub(crate) struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub usage: Option<WireUsage>,
    pub stop_reason: Option<String>,
}

impl MessagesResponse {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.usage
            .as_ref()
            .map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct WireUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// POST one Messages API call.
pub(crate) async fn send_messages(
    http_client: &reqwest::Client,
    api_url: &str,
    api_key: &str,
    body: &MessagesRequest,
) -> Result<MessagesResponse> {
    let response = http_client
        .post(api_url)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("content-type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(SERVICE, e))?;

    let response = check_status(SERVICE, response).await?;

    response.json().await.map_err(|e| {
        CoachError::integration(SERVICE, format!("failed to parse response: {e}"), false)
    })
}

pub struct AnthropicClient {
    model: String,
    api_key: String,
    api_url: String,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(model: String, api_key: String) -> Self {
        Self {
            model,
            api_key,
            api_url: ANTHROPIC_API_URL.to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn build_request_body(&self, request: &LlmRequest) -> MessagesRequest {
        let messages = request
            .messages
            .iter()
            .filter(|msg| msg.role != Role::System)
            .map(|msg| WireMessage {
                role: match msg.role {
                    Role::Assistant => "assistant".into(),
                    _ => "user".into(),
                },
                content: vec![ContentBlock::Text {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        MessagesRequest {
            model: self.model.clone(),
            messages,
            system: request.system_prompt.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens.unwrap_or(1024),
            tools: vec![],
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(&request);
        let response =
            send_messages(&self.http_client, &self.api_url, &self.api_key, &body).await?;

        Ok(LlmResponse {
            content: response.text(),
            usage: Some(response.token_usage()),
            model: response.model,
            finish_reason: response.stop_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;

    #[test]
    fn system_prompt_is_top_level() {
        let client = AnthropicClient::new("claude-3-5-haiku-latest".into(), "key".into());
        let request = LlmRequest {
            system_prompt: Some("Route the message.".into()),
            messages: vec![
                ChatMessage::user("I slept badly"),
                ChatMessage::assistant("Sorry to hear that."),
            ],
            temperature: Some(0.1),
            max_tokens: None,
        };

        let json = serde_json::to_value(client.build_request_body(&request)).unwrap();
        assert_eq!(json["system"], "Route the message.");
        assert_eq!(json["max_tokens"], 1024);
        assert!(json.get("tools").is_none());

        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"][0]["type"], "text");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[test]
    fn parses_tool_use_and_unknown_blocks() {
        let raw = serde_json::json!({
            "model": "claude",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 4},
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "tu_1", "name": "mcp__coach__get_workouts", "input": {"days": 7}}
            ]
        });
        let response: MessagesResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.text(), "Let me check.");
        assert_eq!(response.token_usage().input_tokens, 10);
        assert_eq!(response.content[0], ContentBlock::Unknown);
        assert!(matches!(
            &response.content[2],
            ContentBlock::ToolUse { name, .. } if name == "mcp__coach__get_workouts"
        ));
    }

    #[test]
    fn tool_result_block_serializes() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "tu_1".into(),
            content: "[]".into(),
            is_error: true,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["is_error"], true);
    }
}
