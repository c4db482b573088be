//! Conversation service backed by the Anthropic Messages API.
//!
//! Runs the tool-use loop locally: each model turn is one Messages call; any
//! `tool_use` blocks are dispatched to the request's [`ToolServer`] and their
//! outputs sent back as `tool_result` blocks until the model stops asking for
//! tools, the turn cap is hit, or the spend cap is exceeded.
//!
//! Responses are requested without streaming, so `PartialDelta` items are
//! buffered: each carries a whole text block of a finished turn and arrives
//! just before that turn's `Assistant` message.
//!
//! Transcripts of finished runs are kept for resumption until the caller
//! ends the session or the least recently used ones fall past
//! `max_sessions`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_stream::try_stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use stride_common::{CoachError, Result};
use tracing::{debug, warn};

use crate::anthropic::{
    ANTHROPIC_API_URL, ContentBlock, MessagesRequest, SERVICE, WireMessage, WireTool,
    send_messages,
};
use crate::client::TokenUsage;
use crate::config::{ConversationConfig, Pricing};
use crate::conversation::{
    ConversationMessage, ConversationRequest, ConversationService, MessageStream, ResultSubtype,
    TerminalResult, ToolOutput, ToolServer,
};
use crate::retry::{RetryConfig, with_retry};

struct Inner {
    model: String,
    api_key: String,
    api_url: String,
    max_tokens: u32,
    pricing: Pricing,
    retry: RetryConfig,
    http_client: reqwest::Client,
    sessions: Mutex<SessionTable>,
}

/// Transcripts by session id, bounded by least recent use.
struct SessionTable {
    capacity: usize,
    clock: u64,
    entries: HashMap<String, (u64, Vec<WireMessage>)>,
}

impl SessionTable {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            entries: HashMap::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, id: &str) -> Option<Vec<WireMessage>> {
        let now = self.tick();
        self.entries.get_mut(id).map(|(used, transcript)| {
            *used = now;
            transcript.clone()
        })
    }

    fn insert(&mut self, id: String, transcript: Vec<WireMessage>) {
        let now = self.tick();
        self.entries.insert(id, (now, transcript));
        while self.entries.len() > self.capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (used, _))| *used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!(session_id = %oldest, "Evicting least recently used session");
            self.entries.remove(&oldest);
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Clone)]
pub struct AnthropicConversation {
    inner: Arc<Inner>,
}

impl AnthropicConversation {
    pub fn new(config: &ConversationConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            CoachError::Config("conversation service requires an Anthropic API key".into())
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                model: config.model.clone(),
                api_key,
                api_url: config
                    .api_url
                    .clone()
                    .unwrap_or_else(|| ANTHROPIC_API_URL.to_string()),
                max_tokens: config.max_tokens,
                pricing: config.pricing.clone(),
                retry: config.retry.clone(),
                http_client: reqwest::Client::new(),
                sessions: Mutex::new(SessionTable::new(config.max_sessions)),
            }),
        })
    }

    /// Number of resumable sessions held in memory.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }
}

impl Inner {
    /// Prior transcript for `session_id` with the new user prompt appended.
    fn start_transcript(&self, session_id: Option<&str>, user_prompt: &str) -> Vec<WireMessage> {
        let mut transcript = match session_id {
            Some(id) => match self.sessions.lock().get(id) {
                Some(prior) => prior,
                None => {
                    warn!(session_id = %id, "Unknown session; starting fresh");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        // A run that stopped mid tool-loop leaves a trailing user turn.
        match transcript.last_mut() {
            Some(last) if last.role == "user" => last.content.push(ContentBlock::Text {
                text: user_prompt.to_string(),
            }),
            _ => transcript.push(WireMessage::user_text(user_prompt)),
        }
        transcript
    }

    async fn turn(&self, body: &MessagesRequest) -> Result<crate::anthropic::MessagesResponse> {
        with_retry(&self.retry, SERVICE, || {
            send_messages(&self.http_client, &self.api_url, &self.api_key, body)
        })
        .await
    }
}

fn wire_tools(server: Option<&ToolServer>) -> Vec<WireTool> {
    server
        .map(|s| {
            s.tools
                .iter()
                .map(|t| WireTool {
                    name: s.qualified_name(&t.name),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn dispatch(server: Option<&ToolServer>, name: &str, input: serde_json::Value) -> ToolOutput {
    match server.and_then(|s| s.resolve(name)) {
        Some(tool) => tool.handler.call(input).await,
        None => ToolOutput::error(format!("Unknown tool: {name}")),
    }
}

#[async_trait]
impl ConversationService for AnthropicConversation {
    async fn open(&self, request: ConversationRequest) -> Result<MessageStream> {
        let inner = Arc::clone(&self.inner);
        let session_id = request
            .resume_session
            .clone()
            .unwrap_or_else(|| format!("sess_{}", uuid::Uuid::new_v4()));
        let mut transcript =
            inner.start_transcript(request.resume_session.as_deref(), &request.user_prompt);
        let tools = wire_tools(request.tool_server.as_ref());

        let stream = try_stream! {
            let started = Instant::now();
            let mut usage = TokenUsage::default();
            let mut turns: u32 = 0;

            let (subtype, result) = loop {
                if turns >= request.max_turns {
                    break (ResultSubtype::ErrorMaxTurns, None);
                }

                let body = MessagesRequest {
                    model: inner.model.clone(),
                    messages: transcript.clone(),
                    system: Some(request.system_prompt.clone()),
                    temperature: None,
                    max_tokens: inner.max_tokens,
                    tools: tools.clone(),
                };
                let response = inner.turn(&body).await?;
                turns += 1;
                usage.add(response.token_usage());

                let text = response.text();
                if request.include_partial {
                    for block in &response.content {
                        if let ContentBlock::Text { text } = block {
                            yield ConversationMessage::PartialDelta { text: text.clone() };
                        }
                    }
                }
                yield ConversationMessage::Assistant { text: text.clone() };

                let tool_uses: Vec<(String, String, serde_json::Value)> = response
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolUse { id, name, input } => {
                            Some((id.clone(), name.clone(), input.clone()))
                        }
                        _ => None,
                    })
                    .collect();

                let kept: Vec<ContentBlock> = response
                    .content
                    .into_iter()
                    .filter(|b| !matches!(b, ContentBlock::Unknown))
                    .collect();
                transcript.push(WireMessage { role: "assistant".into(), content: kept });

                if tool_uses.is_empty() {
                    break (ResultSubtype::Success, Some(text));
                }

                let over_budget = request
                    .max_budget_usd
                    .is_some_and(|cap| inner.pricing.cost(&usage) >= cap);
                if over_budget {
                    break (ResultSubtype::ErrorMaxBudget, None);
                }

                let mut results = Vec::with_capacity(tool_uses.len());
                for (id, name, input) in tool_uses {
                    debug!(tool = %name, "Dispatching tool call");
                    yield ConversationMessage::ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    };
                    let output = dispatch(request.tool_server.as_ref(), &name, input).await;
                    results.push(ContentBlock::ToolResult {
                        tool_use_id: id.clone(),
                        content: output.content.clone(),
                        is_error: output.is_error,
                    });
                    yield ConversationMessage::ToolResult { id, name, output };
                }
                transcript.push(WireMessage { role: "user".into(), content: results });
            };

            inner.sessions.lock().insert(session_id.clone(), transcript);

            yield ConversationMessage::Result(TerminalResult {
                subtype,
                result,
                session_id,
                num_turns: turns,
                usage,
                total_cost_usd: inner.pricing.cost(&usage),
                duration_ms: started.elapsed().as_millis() as u64,
            });
        };

        Ok(Box::pin(stream))
    }

    async fn end_session(&self, session_id: &str) {
        if self.inner.sessions.lock().remove(session_id) {
            debug!(session_id = %session_id, "Session ended");
        }
    }
}
