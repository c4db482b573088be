//! Agent trait definitions.

use stride_common::{AgentContext, CoachError, Result, TaskKind};

/// Identity and limits shared by every agent definition.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
    /// Per-agent turn cap; the harness default applies when unset.
    pub max_turns: Option<u32>,
}

/// An LLM-driven agent: prompts, tools and limits. The conversation itself
/// is run by [`AgentHarness`](crate::AgentHarness).
pub trait CoachAgent: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// One line for routing instructions and logs.
    fn description(&self) -> &str;

    /// Names of registered tools this agent may call.
    fn tools(&self) -> &[&'static str];

    fn max_turns(&self) -> Option<u32>;

    fn system_prompt(&self, ctx: &AgentContext) -> Result<String>;

    /// The user prompt for `ctx.task`. Task kinds the agent does not handle
    /// are a validation error.
    fn user_prompt(&self, ctx: &AgentContext) -> Result<String>;
}

/// The error for a task kind an agent was not built to handle.
pub fn unsupported(agent_id: &str, task: &TaskKind) -> CoachError {
    CoachError::validation(
        "task",
        format!("agent '{agent_id}' does not handle '{}' tasks", task.name()),
    )
}
