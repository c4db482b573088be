//! Specialist agents and the harness that runs them.
//!
//! - **Coach**: training conversation and the morning briefing
//! - **Wellness**: readiness, recovery, sleep and injuries
//! - **Analyst**: post-workout and weekly analysis
//! - **Planner**: plan adjustments and weekly plan review
//!
//! # Architecture
//!
//! An agent is only a definition: prompts, a tool list and a turn cap. The
//! [`AgentHarness`] runs it against an [`AgentContext`](stride_common::AgentContext)
//! through the tool-calling conversation service. Agents never call each
//! other; they share findings through the whiteboard.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       AGENT HARNESS                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────┐  ┌──────────┐  ┌─────────┐  ┌─────────┐         │
//! │  │  Coach  │  │ Wellness │  │ Analyst │  │ Planner │         │
//! │  └────┬────┘  └────┬─────┘  └────┬────┘  └────┬────┘         │
//! │       │            │             │            │              │
//! │       ▼            ▼             ▼            ▼              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │     Tools (mcp__{agent}__{tool}) ─▶ Whiteboard / Store │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod analyst;
pub mod coach;
pub mod harness;
pub mod planner;
pub mod prompt;
pub mod tools;
pub mod traits;
pub mod wellness;
pub mod workflow;

pub use analyst::AnalystAgent;
pub use coach::CoachAgentDef;
pub use harness::{
    AgentHarness, AgentResult, ExecuteOptions, ExecutionObserver, HarnessConfig, TextSink,
};
pub use planner::PlannerAgent;
pub use tools::{CoachTool, ToolCallRecord, ToolCollector, ToolRegistry};
pub use traits::{AgentConfig, CoachAgent};
pub use wellness::WellnessAgent;
pub use workflow::{StageRecord, StageRecorder, StageStatus};
