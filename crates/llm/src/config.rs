use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stride_common::{CoachError, Result};

use crate::anthropic::AnthropicClient;
use crate::client::{LlmClient, LlmRequest, LlmResponse, TokenUsage};
use crate::conversation::ConversationService;
use crate::openai::OpenAiClient;
use crate::retry::{RetryConfig, RetryingClient};
use crate::tool_loop::AnthropicConversation;

/// Environment variable consulted when no key is configured for a provider.
pub fn default_api_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Completion client settings (the router's classifier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_concurrent() -> usize {
    2
}

impl LlmConfig {
    /// Configured key first, then the provider's environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| default_api_key_env(&self.provider).and_then(non_empty_env))
    }
}

/// Per-million-token prices used to compute conversation cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default = "default_input_price")]
    pub input_per_mtok: f64,
    #[serde(default = "default_output_price")]
    pub output_per_mtok: f64,
}

fn default_input_price() -> f64 {
    3.0
}

fn default_output_price() -> f64 {
    15.0
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_mtok: default_input_price(),
            output_per_mtok: default_output_price(),
        }
    }
}

impl Pricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_mtok
            + usage.output_tokens as f64 * self.output_per_mtok)
            / 1_000_000.0
    }
}

/// Settings for the tool-calling conversation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_conversation_model")]
    pub model: String,
    pub api_key: Option<String>,
    /// Environment variable to read the key from when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub api_url: Option<String>,
    #[serde(default = "default_conversation_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Resumable transcripts kept in memory; the least recently used is
    /// dropped past this.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_sessions() -> usize {
    512
}

fn default_conversation_model() -> String {
    "claude-sonnet-4-5".into()
}

fn default_conversation_max_tokens() -> u32 {
    4096
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: default_conversation_model(),
            api_key: None,
            api_key_env: None,
            api_url: None,
            max_tokens: default_conversation_max_tokens(),
            pricing: Pricing::default(),
            retry: RetryConfig::default(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl ConversationConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        let env_var = self
            .api_key_env
            .as_deref()
            .or_else(|| default_api_key_env("anthropic"));
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env_var.and_then(non_empty_env))
    }
}

pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self.semaphore.acquire().await.map_err(|e| {
            CoachError::integration(self.inner.model_name(), format!("semaphore closed: {e}"), false)
        })?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Build a completion client: provider client, wrapped in retries, wrapped
/// in a concurrency limit.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let base_client: Box<dyn LlmClient> = match config.provider.as_str() {
        "openai" => Box::new(OpenAiClient::new(
            config.api_url.clone(),
            config.model.clone(),
            config.resolve_api_key(),
        )),
        "anthropic" => {
            let api_key = config
                .resolve_api_key()
                .ok_or_else(|| CoachError::Config("Anthropic requires an API key".into()))?;
            let client = AnthropicClient::new(config.model.clone(), api_key);
            match &config.api_url {
                Some(url) => Box::new(client.with_api_url(url.clone())),
                None => Box::new(client),
            }
        }
        other => {
            return Err(CoachError::Config(format!("Unknown LLM provider: {other}")));
        }
    };

    let retrying: Box<dyn LlmClient> =
        Box::new(RetryingClient::new(base_client, config.retry.clone()));

    Ok(Arc::new(SemaphoredClient::new(
        Arc::from(retrying),
        config.max_concurrent_requests,
    )))
}

pub fn build_conversation_service(
    config: &ConversationConfig,
) -> Result<Arc<dyn ConversationService>> {
    Ok(Arc::new(AnthropicConversation::new(config)?))
}
