//! Tools agents can call, and their adapter onto the conversation service.
//!
//! A [`CoachTool`] is written against our own types: typed arguments, the
//! [`AgentContext`] and a [`ToolCollector`]. [`ToolRegistry::server_for`]
//! wraps the tools an agent declares into a [`ToolServer`] named after the
//! agent, so the model sees `mcp__{agent}__{tool}`.

mod training;
mod whiteboard;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use stride_common::{AgentContext, CoachError, Result, WhiteboardEntry};
use stride_llm::{ServerTool, ToolHandler, ToolOutput, ToolServer};
use stride_whiteboard::Whiteboard;
use tracing::{debug, warn};

pub use training::{GetHealthMetrics, GetWorkouts};
pub use whiteboard::{PostToWhiteboard, ReadWhiteboard};

pub const POST_TO_WHITEBOARD: &str = "post_to_whiteboard";
pub const READ_WHITEBOARD: &str = "read_whiteboard";
pub const GET_WORKOUTS: &str = "get_workouts";
pub const GET_HEALTH_METRICS: &str = "get_health_metrics";

#[async_trait]
pub trait CoachTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    /// Run the tool. An `Err` is reported to the model as a tool error; it
    /// does not end the conversation.
    async fn execute(
        &self,
        args: Value,
        ctx: &AgentContext,
        collector: &ToolCollector,
    ) -> Result<String>;
}

/// JSON schema for a tool's argument type.
pub fn schema_for<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema
}

/// Deserialize tool arguments, mapping failures to a validation error.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    // Models sometimes send `null` for tools without required arguments.
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| CoachError::validation(tool, e.to_string()))
}

/// One tool invocation as seen by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: Value,
    pub output: String,
    pub is_error: bool,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Collected {
    calls: Vec<ToolCallRecord>,
    posts: Vec<WhiteboardEntry>,
}

/// Shared sink every tool of one agent run writes through.
#[derive(Clone)]
pub struct ToolCollector {
    agent_id: String,
    inner: Arc<Mutex<Collected>>,
}

impl ToolCollector {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            inner: Arc::default(),
        }
    }

    /// The agent the tools run for; used as the author of posted entries.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn record_post(&self, entry: WhiteboardEntry) {
        self.inner.lock().posts.push(entry);
    }

    fn record_call(&self, record: ToolCallRecord) {
        self.inner.lock().calls.push(record);
    }

    pub fn calls(&self) -> Vec<ToolCallRecord> {
        self.inner.lock().calls.clone()
    }

    pub fn posts(&self) -> Vec<WhiteboardEntry> {
        self.inner.lock().posts.clone()
    }
}

/// Bridges a [`CoachTool`] to the conversation service's handler shape.
struct AdaptedTool {
    tool: Arc<dyn CoachTool>,
    ctx: AgentContext,
    collector: ToolCollector,
}

#[async_trait]
impl ToolHandler for AdaptedTool {
    async fn call(&self, input: Value) -> ToolOutput {
        let name = self.tool.name().to_string();
        let output = match self.tool.execute(input.clone(), &self.ctx, &self.collector).await {
            Ok(content) => {
                debug!(agent = %self.collector.agent_id(), tool = %name, "Tool succeeded");
                ToolOutput::ok(content)
            }
            Err(e) => {
                warn!(agent = %self.collector.agent_id(), tool = %name, code = e.code(), error = %e, "Tool failed");
                ToolOutput::error(format!("{}: {e}", e.code()))
            }
        };
        self.collector.record_call(ToolCallRecord {
            name,
            input,
            output: output.content.clone(),
            is_error: output.is_error,
            at: Utc::now(),
        });
        output
    }
}

/// Tools available to agents, by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn CoachTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in tool set.
    pub fn standard(whiteboard: Whiteboard) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PostToWhiteboard::new(whiteboard.clone())));
        registry.register(Arc::new(ReadWhiteboard::new(whiteboard)));
        registry.register(Arc::new(GetWorkouts));
        registry.register(Arc::new(GetHealthMetrics));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn CoachTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CoachTool>> {
        self.tools.get(name).cloned()
    }

    /// Build the tool server for one agent run. Returns `None` when the agent
    /// declares no tools, and `NotFound` for a declared tool that is not
    /// registered.
    pub fn server_for(
        &self,
        agent_id: &str,
        names: &[&str],
        ctx: &AgentContext,
        collector: &ToolCollector,
    ) -> Result<Option<ToolServer>> {
        if names.is_empty() {
            return Ok(None);
        }
        let mut server = ToolServer::new(agent_id);
        for name in names {
            let tool = self
                .get(name)
                .ok_or_else(|| CoachError::not_found("tool", *name))?;
            server = server.with_tool(ServerTool {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
                handler: Arc::new(AdaptedTool {
                    tool,
                    ctx: ctx.clone(),
                    collector: collector.clone(),
                }),
            });
        }
        Ok(Some(server))
    }
}
