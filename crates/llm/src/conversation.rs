//! Tool-calling conversation service abstraction.
//!
//! A [`ConversationService`] is handed a system prompt, a user prompt, a
//! [`ToolServer`] and some bounds. It decides which tools to call and when to
//! stop; the caller only consumes the resulting [`MessageStream`], which ends
//! with a single [`ConversationMessage::Result`] on a well-formed run.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use stride_common::Result;

use crate::client::TokenUsage;

/// Prefix of every namespaced tool name exposed to the model.
pub const TOOL_NAMESPACE: &str = "mcp";

/// Outcome of one tool invocation as fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Executes one tool on behalf of the conversation service.
///
/// Handlers report failure through [`ToolOutput::error`]; they never fail the
/// conversation itself.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: serde_json::Value) -> ToolOutput;
}

/// A tool as registered with the conversation service.
#[derive(Clone)]
pub struct ServerTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ServerTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A named group of tools. Tool names are exposed to the model as
/// `mcp__{server}__{tool}` so tools of different agents never collide.
#[derive(Debug, Clone)]
pub struct ToolServer {
    pub name: String,
    pub tools: Vec<ServerTool>,
}

impl ToolServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: vec![],
        }
    }

    pub fn with_tool(mut self, tool: ServerTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn qualified_name(&self, tool: &str) -> String {
        format!("{TOOL_NAMESPACE}__{}__{tool}", self.name)
    }

    /// Look a tool up by its qualified name.
    pub fn resolve(&self, qualified: &str) -> Option<&ServerTool> {
        let prefix = format!("{TOOL_NAMESPACE}__{}__", self.name);
        let bare = qualified.strip_prefix(&prefix)?;
        self.tools.iter().find(|t| t.name == bare)
    }

    pub fn qualified_names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| self.qualified_name(&t.name))
            .collect()
    }
}

/// Everything needed to start (or resume) one bounded conversation.
#[derive(Debug, Clone)]
pub struct ConversationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub tool_server: Option<ToolServer>,
    pub max_turns: u32,
    pub max_budget_usd: Option<f64>,
    pub resume_session: Option<String>,
    /// Emit [`ConversationMessage::PartialDelta`] fragments as text arrives.
    pub include_partial: bool,
}

impl ConversationRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            tool_server: None,
            max_turns: 10,
            max_budget_usd: None,
            resume_session: None,
            include_partial: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    ErrorMaxTurns,
    ErrorMaxBudget,
    ErrorDuringExecution,
}

impl ResultSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ErrorMaxTurns => "error_max_turns",
            Self::ErrorMaxBudget => "error_max_budget",
            Self::ErrorDuringExecution => "error_during_execution",
        }
    }
}

/// Terminal message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalResult {
    pub subtype: ResultSubtype,
    /// Final text, present on success.
    pub result: Option<String>,
    pub session_id: String,
    pub num_turns: u32,
    pub usage: TokenUsage,
    pub total_cost_usd: f64,
    pub duration_ms: u64,
}

impl TerminalResult {
    pub fn is_success(&self) -> bool {
        self.subtype == ResultSubtype::Success
    }
}

/// One event of a conversation, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationMessage {
    /// One model turn. `text` may be empty when the turn only called tools.
    Assistant { text: String },
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        id: String,
        name: String,
        output: ToolOutput,
    },
    /// Incremental text, only when `include_partial` was requested.
    PartialDelta { text: String },
    Result(TerminalResult),
}

pub type MessageStream = Pin<Box<dyn Stream<Item = Result<ConversationMessage>> + Send>>;

/// The external LLM tool-calling service.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Start the conversation. Errors here mean it could not be opened;
    /// errors mid-run arrive as `Err` items on the stream.
    async fn open(&self, request: ConversationRequest) -> Result<MessageStream>;

    /// Forget a session's transcript. Unknown ids are ignored.
    async fn end_session(&self, _session_id: &str) {}
}
