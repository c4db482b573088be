//! Scripted test doubles for the LLM seams.
//!
//! Model behaviour is never asserted live. Tests queue the exact message
//! sequence a conversation should produce (or the completions a client
//! should return) and assert on what the code under test did with it.

use std::collections::VecDeque;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use stride_common::{CoachError, Result};

use crate::client::{LlmClient, LlmRequest, LlmResponse, TokenUsage};
use crate::conversation::{
    ConversationMessage, ConversationRequest, ConversationService, MessageStream, ResultSubtype,
    TerminalResult, ToolOutput,
};

/// One step of a scripted conversation.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit this message as-is.
    Message(ConversationMessage),
    /// Invoke a tool from the request's tool server by its bare name, emitting
    /// the tool call and its result.
    CallTool {
        tool: String,
        input: serde_json::Value,
    },
    /// Emit an error item.
    Fail(String),
    /// Emit assistant messages forever.
    Endless(String),
}

impl ScriptStep {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Message(ConversationMessage::Assistant { text: text.into() })
    }

    pub fn partial(text: impl Into<String>) -> Self {
        Self::Message(ConversationMessage::PartialDelta { text: text.into() })
    }

    pub fn tool(tool: impl Into<String>, input: serde_json::Value) -> Self {
        Self::CallTool {
            tool: tool.into(),
            input,
        }
    }

    pub fn success(result: impl Into<String>, num_turns: u32) -> Self {
        Self::Message(ConversationMessage::Result(terminal(
            ResultSubtype::Success,
            Some(result.into()),
            num_turns,
        )))
    }

    pub fn terminal(subtype: ResultSubtype, num_turns: u32) -> Self {
        Self::Message(ConversationMessage::Result(terminal(subtype, None, num_turns)))
    }
}

/// A terminal result with fixed usage, for scripts.
pub fn terminal(subtype: ResultSubtype, result: Option<String>, num_turns: u32) -> TerminalResult {
    TerminalResult {
        subtype,
        result,
        session_id: "scripted-session".into(),
        num_turns,
        usage: TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        },
        total_cost_usd: 0.001,
        duration_ms: 5,
    }
}

#[derive(Default)]
struct ConversationState {
    scripts: VecDeque<Vec<ScriptStep>>,
    requests: Vec<ConversationRequest>,
    ended: Vec<String>,
}

/// A [`ConversationService`] that replays queued scripts, one per `open`.
#[derive(Clone, Default)]
pub struct ScriptedConversation {
    state: Arc<Mutex<ConversationState>>,
}

impl ScriptedConversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next `open` call.
    pub fn push_script(&self, steps: Vec<ScriptStep>) -> &Self {
        self.state.lock().scripts.push_back(steps);
        self
    }

    /// Queue a one-turn run that answers `text` successfully.
    pub fn push_reply(&self, text: &str) -> &Self {
        self.push_script(vec![
            ScriptStep::assistant(text),
            ScriptStep::success(text, 1),
        ])
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ConversationRequest> {
        self.state.lock().requests.clone()
    }

    pub fn remaining_scripts(&self) -> usize {
        self.state.lock().scripts.len()
    }

    /// Session ids passed to `end_session`, in order.
    pub fn ended_sessions(&self) -> Vec<String> {
        self.state.lock().ended.clone()
    }
}

#[async_trait]
impl ConversationService for ScriptedConversation {
    async fn open(&self, request: ConversationRequest) -> Result<MessageStream> {
        let steps = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.scripts.pop_front()
        };
        let steps = steps
            .ok_or_else(|| CoachError::integration("scripted", "no script queued", false))?;

        let stream = stream! {
            for step in steps {
                match step {
                    ScriptStep::Message(msg) => {
                        yield Ok(msg);
                    }
                    ScriptStep::CallTool { tool, input } => {
                        let server = request.tool_server.as_ref();
                        let name = server
                            .map(|s| s.qualified_name(&tool))
                            .unwrap_or_else(|| tool.clone());
                        yield Ok(ConversationMessage::ToolCall {
                            id: format!("call_{tool}"),
                            name: name.clone(),
                            input: input.clone(),
                        });
                        let output = match server.and_then(|s| s.resolve(&name)) {
                            Some(t) => t.handler.call(input).await,
                            None => ToolOutput::error(format!("Unknown tool: {name}")),
                        };
                        yield Ok(ConversationMessage::ToolResult {
                            id: format!("call_{tool}"),
                            name,
                            output,
                        });
                    }
                    ScriptStep::Fail(message) => {
                        yield Err(CoachError::integration("scripted", message, false));
                    }
                    ScriptStep::Endless(text) => loop {
                        yield Ok(ConversationMessage::Assistant { text: text.clone() });
                    },
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn end_session(&self, session_id: &str) {
        self.state.lock().ended.push(session_id.to_string());
    }
}

#[derive(Default)]
struct ClientState {
    responses: VecDeque<Result<String>>,
    requests: Vec<LlmRequest>,
}

/// An [`LlmClient`] that returns queued completions or errors.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    state: Arc<Mutex<ClientState>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, content: impl Into<String>) -> &Self {
        self.state.lock().responses.push_back(Ok(content.into()));
        self
    }

    pub fn push_err(&self, error: CoachError) -> &Self {
        self.state.lock().responses.push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.state.lock().requests.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let next = {
            let mut state = self.state.lock();
            state.requests.push(request);
            state.responses.pop_front()
        };
        let content = next.unwrap_or_else(|| {
            Err(CoachError::integration("scripted", "no completion queued", false))
        })?;
        Ok(LlmResponse {
            content,
            model: "scripted".into(),
            usage: None,
            finish_reason: Some("stop".into()),
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
