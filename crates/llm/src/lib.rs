pub mod anthropic;
pub mod client;
pub mod config;
pub mod conversation;
pub mod openai;
pub mod retry;
pub mod scripted;
pub mod tool_loop;

pub use anthropic::AnthropicClient;
pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{
    ConversationConfig, LlmConfig, Pricing, SemaphoredClient, build_conversation_service,
    build_llm_client,
};
pub use conversation::{
    ConversationMessage, ConversationRequest, ConversationService, MessageStream, ResultSubtype,
    ServerTool, TerminalResult, ToolHandler, ToolOutput, ToolServer,
};
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient, with_retry};
pub use tool_loop::AnthropicConversation;
