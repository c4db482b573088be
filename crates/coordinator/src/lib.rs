//! Routing and orchestration for Stride.
//!
//! The coordinator is the entry point for every trigger:
//! 1. Loads configuration ([`StrideConfig`])
//! 2. Routes free-text chat to one agent ([`MessageRouter`])
//! 3. Runs the named pipelines, stage by stage ([`Coordinator`])
//! 4. Caches resumable chat sessions ([`SessionCache`])
//!
//! # Architecture
//!
//! ```text
//! trigger (cli, cron, chat)
//!      │
//!      ▼
//! ┌─────────────────┐
//! │   Coordinator   │  ◄── MessageRouter (quick match / classifier / keywords)
//! └────────┬────────┘
//!          │ stages
//!    ┌─────┴──────┬──────────────┬───────────────┐
//!    ▼            ▼              ▼               ▼
//! [Sync]   [ContextLoader]  [AgentHarness]  [Whiteboard]
//!  skills       skills          agents         shared
//! ```

pub mod config;
pub mod router;
pub mod session;
pub mod workflows;

pub use config::{SessionConfig, StoreConfig, StrideConfig};
pub use router::{MessageRouter, QuickMatchRule, RoutableAgent, RouteResult, RouteTier, RouterConfig};
pub use session::SessionCache;
pub use workflows::{Coordinator, CoordinatorParts, PipelineResult};
