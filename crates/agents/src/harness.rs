//! Agent execution harness.
//!
//! Runs one agent against one context: builds the prompts, registers the
//! agent's tools, opens a bounded conversation and consumes it to a terminal
//! result. The conversation service decides which tools run and when to
//! stop; the harness only enforces the turn cap and relays streamed text.
//!
//! Every failure comes back as a typed error carrying the agent id and the
//! phase it happened in. Nothing is swallowed.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use stride_common::{
    AgentContext, CoachError, ExecutionPhase, Logger, Result, TaskKind, WhiteboardEntry,
};
use stride_llm::{ConversationMessage, ConversationRequest, ConversationService, TokenUsage};
use tracing::{Instrument, debug, error, info};

use crate::tools::{ToolCallRecord, ToolCollector, ToolRegistry};
use crate::traits::CoachAgent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Turn cap for agents that do not set their own.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Spend cap per conversation, enforced by the conversation service.
    #[serde(default)]
    pub max_budget_usd: Option<f64>,
}

fn default_max_turns() -> u32 {
    12
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_budget_usd: None,
        }
    }
}

/// Lifecycle callbacks for one invocation. Advisory only: they cannot change
/// the outcome.
pub trait ExecutionObserver: Send + Sync {
    fn on_start(&self, _agent_id: &str, _task: &TaskKind) {}
    fn on_message(&self, _agent_id: &str, _message: &ConversationMessage) {}
    fn on_complete(&self, _result: &AgentResult) {}
    fn on_error(&self, _agent_id: &str, _error: &CoachError) {}
}

#[derive(Clone, Default)]
pub struct ExecuteOptions {
    /// Continue an earlier conversation.
    pub resume_session: Option<String>,
    /// Overrides the agent's and the harness's turn cap.
    pub max_turns: Option<u32>,
    pub observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl ExecuteOptions {
    pub fn resume(session_id: impl Into<String>) -> Self {
        Self {
            resume_session: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub text: String,
    pub session_id: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub whiteboard_posts: Vec<WhiteboardEntry>,
    pub num_turns: u32,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// Sink for streamed text fragments. Returning an error aborts the run.
pub type TextSink<'a> = &'a mut (dyn FnMut(&str) -> Result<()> + Send);

pub struct AgentHarness {
    service: Arc<dyn ConversationService>,
    tools: ToolRegistry,
    config: HarnessConfig,
    log: Logger,
}

impl AgentHarness {
    pub fn new(
        service: Arc<dyn ConversationService>,
        tools: ToolRegistry,
        config: HarnessConfig,
        log: Logger,
    ) -> Self {
        Self {
            service,
            tools,
            config,
            log,
        }
    }

    /// Release a resumable session that will not be continued.
    pub async fn end_session(&self, session_id: &str) {
        self.service.end_session(session_id).await;
    }

    pub async fn execute(
        &self,
        agent: &dyn CoachAgent,
        ctx: &AgentContext,
        options: ExecuteOptions,
    ) -> Result<AgentResult> {
        self.run(agent, ctx, options, None).await
    }

    /// Like [`execute`](Self::execute), additionally handing each text
    /// fragment to `on_text` as it arrives.
    pub async fn execute_streaming(
        &self,
        agent: &dyn CoachAgent,
        ctx: &AgentContext,
        options: ExecuteOptions,
        on_text: TextSink<'_>,
    ) -> Result<AgentResult> {
        self.run(agent, ctx, options, Some(on_text)).await
    }

    async fn run(
        &self,
        agent: &dyn CoachAgent,
        ctx: &AgentContext,
        options: ExecuteOptions,
        on_text: Option<TextSink<'_>>,
    ) -> Result<AgentResult> {
        let span = self
            .log
            .with_user(&ctx.user_id)
            .scoped("agent", agent.id())
            .span();
        let observers = options.observers.clone();

        async {
            for o in &observers {
                o.on_start(agent.id(), &ctx.task);
            }
            info!(task = ctx.task.name(), "Agent run starting");

            let result = self.drive(agent, ctx, options, on_text).await;
            match &result {
                Ok(r) => {
                    info!(
                        turns = r.num_turns,
                        tool_calls = r.tool_calls.len(),
                        posts = r.whiteboard_posts.len(),
                        cost_usd = r.cost_usd,
                        duration_ms = r.duration_ms,
                        "Agent run complete"
                    );
                    for o in &observers {
                        o.on_complete(r);
                    }
                }
                Err(e) => {
                    error!(code = e.code(), error = %e, "Agent run failed");
                    for o in &observers {
                        o.on_error(agent.id(), e);
                    }
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        agent: &dyn CoachAgent,
        ctx: &AgentContext,
        options: ExecuteOptions,
        mut on_text: Option<TextSink<'_>>,
    ) -> Result<AgentResult> {
        let started = Instant::now();
        let agent_id = agent.id();
        let wrap = |phase: ExecutionPhase| {
            move |e: CoachError| -> CoachError {
                match e {
                    e @ (CoachError::Agent { .. } | CoachError::NoResult { .. }) => e,
                    other => CoachError::agent(agent_id, phase, other.to_string()),
                }
            }
        };

        let system_prompt = agent
            .system_prompt(ctx)
            .map_err(wrap(ExecutionPhase::Prompt))?;
        let user_prompt = agent.user_prompt(ctx).map_err(wrap(ExecutionPhase::Prompt))?;

        let collector = ToolCollector::new(agent_id);
        let tool_server = self
            .tools
            .server_for(agent_id, agent.tools(), ctx, &collector)
            .map_err(wrap(ExecutionPhase::Tools))?;

        let max_turns = options
            .max_turns
            .or_else(|| agent.max_turns())
            .unwrap_or(self.config.max_turns);
        let request = ConversationRequest {
            system_prompt,
            user_prompt,
            tool_server,
            max_turns,
            max_budget_usd: self.config.max_budget_usd,
            resume_session: options.resume_session,
            include_partial: on_text.is_some(),
        };

        let mut stream = self
            .service
            .open(request)
            .await
            .map_err(wrap(ExecutionPhase::Conversation))?;

        let mut turns = 0u32;
        let mut text = String::new();
        let mut streamed_this_turn = false;
        let mut terminal = None;

        while let Some(item) = stream.next().await {
            let message = item.map_err(wrap(ExecutionPhase::Conversation))?;
            for o in &options.observers {
                o.on_message(agent_id, &message);
            }

            match message {
                ConversationMessage::Assistant { text: turn_text } => {
                    turns += 1;
                    if turns > max_turns {
                        return Err(CoachError::agent(
                            agent_id,
                            ExecutionPhase::Conversation,
                            format!("exceeded {max_turns} turns without a result"),
                        ));
                    }
                    if let Some(sink) = on_text.as_deref_mut() {
                        // Deliver whole turns only when no fragments were streamed.
                        if !streamed_this_turn && !turn_text.is_empty() {
                            sink(&turn_text).map_err(wrap(ExecutionPhase::Stream))?;
                        }
                    }
                    streamed_this_turn = false;
                    if !turn_text.is_empty() {
                        if !text.is_empty() {
                            text.push_str("\n\n");
                        }
                        text.push_str(&turn_text);
                    }
                }
                ConversationMessage::PartialDelta { text: fragment } => {
                    if let Some(sink) = on_text.as_deref_mut() {
                        streamed_this_turn = true;
                        sink(&fragment).map_err(wrap(ExecutionPhase::Stream))?;
                    }
                }
                ConversationMessage::ToolCall { name, .. } => {
                    debug!(tool = %name, turn = turns, "Tool call");
                }
                ConversationMessage::ToolResult { name, output, .. } => {
                    debug!(tool = %name, is_error = output.is_error, "Tool result");
                }
                ConversationMessage::Result(result) => {
                    terminal = Some(result);
                    break;
                }
            }
        }

        let Some(result) = terminal else {
            return Err(CoachError::NoResult {
                agent_id: agent_id.to_string(),
                turns,
            });
        };

        if !result.is_success() {
            return Err(CoachError::agent(
                agent_id,
                ExecutionPhase::Result,
                format!(
                    "conversation ended with {} after {} turns",
                    result.subtype.as_str(),
                    result.num_turns
                ),
            ));
        }

        let text = result
            .result
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(text);

        Ok(AgentResult {
            agent_id: agent_id.to_string(),
            text,
            session_id: result.session_id,
            tool_calls: collector.calls(),
            whiteboard_posts: collector.posts(),
            num_turns: result.num_turns.max(turns),
            usage: result.usage,
            cost_usd: result.total_cost_usd,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
