//! Common types and traits shared across Stride crates.
//!
//! This crate holds the error taxonomy, the logger handle, the domain
//! records, the per-invocation [`AgentContext`] and the [`Store`] trait that
//! every other crate reads and writes through.

pub mod context;
pub mod entry;
pub mod error;
pub mod log;
pub mod message;
pub mod model;
pub mod task;
pub mod traits;

pub use context::{AgentContext, ContextSnapshot};
pub use entry::{EntryFilter, EntryType, NewEntry, Visibility, WhiteboardEntry};
pub use error::{CoachError, ExecutionPhase, Result};
pub use log::Logger;
pub use message::{ChatRole, ChatTurn};
pub use model::{
    Actuals, HealthSample, Injury, NewWorkout, PlanPhase, PlanStatus, Prescription, Split,
    TrainingPlan, Workout, WorkoutStatus,
};
pub use task::TaskKind;
pub use traits::Store;
