use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stride_common::{CoachError, Result};

use crate::client::{
    LlmClient, LlmRequest, LlmResponse, Role, TokenUsage, check_status, transport_error,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const SERVICE: &str = "openai";

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    model: String,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Client for any OpenAI-compatible chat completions endpoint (OpenAI,
/// Ollama, vLLM). Used for the cheap routing classifier.
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, model: String, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    fn build_request_body(&self, request: &LlmRequest) -> OpenAiRequest {
        let system = request.system_prompt.iter().map(|s| OpenAiMessage {
            role: "system".into(),
            content: s.clone(),
        });
        let rest = request.messages.iter().map(|msg| OpenAiMessage {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            }
            .into(),
            content: msg.content.clone(),
        });

        OpenAiRequest {
            model: self.model.clone(),
            messages: system.chain(rest).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.build_request_body(&request);

        let mut http_req = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let parsed: OpenAiResponse = response.json().await.map_err(|e| {
            CoachError::integration(SERVICE, format!("failed to parse response: {e}"), false)
        })?;

        let choice =
            parsed.choices.into_iter().next().ok_or_else(|| {
                CoachError::integration(SERVICE, "response had no choices", false)
            })?;

        Ok(LlmResponse {
            content: choice.message.content,
            model: parsed.model,
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
