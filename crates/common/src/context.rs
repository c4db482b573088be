//! Per-invocation agent context.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::entry::WhiteboardEntry;
use crate::model::{HealthSample, Injury, PlanStatus, Workout};
use crate::task::TaskKind;
use crate::traits::Store;

/// Everything the context loader gathered for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Recent health samples, oldest first.
    pub health: Vec<HealthSample>,
    pub today: Vec<Workout>,
    pub upcoming: Vec<Workout>,
    pub recent: Vec<Workout>,
    pub plan: Option<PlanStatus>,
    pub whiteboard: Vec<WhiteboardEntry>,
    /// `whiteboard` rendered for prompts within the board's token budget.
    #[serde(default)]
    pub whiteboard_digest: String,
    pub injuries: Vec<Injury>,
}

impl ContextSnapshot {
    /// The most recent health sample, if any.
    pub fn latest_health(&self) -> Option<&HealthSample> {
        self.health.last()
    }

    /// Find a workout already loaded into the snapshot.
    pub fn find_workout(&self, id: &str) -> Option<&Workout> {
        self.today
            .iter()
            .chain(&self.recent)
            .chain(&self.upcoming)
            .find(|w| w.id == id)
    }
}

/// Immutable bundle handed to an agent for one invocation.
///
/// Built once per pipeline stage. The snapshot is shared between stages of
/// the same run; the task differs per stage.
#[derive(Clone)]
pub struct AgentContext {
    pub user_id: String,
    pub timezone: Tz,
    /// Target date in the user's timezone.
    pub date: NaiveDate,
    pub task: TaskKind,
    pub snapshot: Arc<ContextSnapshot>,
    pub store: Arc<dyn Store>,
}

impl AgentContext {
    pub fn new(
        user_id: impl Into<String>,
        timezone: Tz,
        date: NaiveDate,
        snapshot: ContextSnapshot,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            timezone,
            date,
            task: TaskKind::General,
            snapshot: Arc::new(snapshot),
            store,
        }
    }

    /// A context for another stage of the same run.
    pub fn with_task(&self, task: TaskKind) -> Self {
        Self {
            task,
            ..self.clone()
        }
    }
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("user_id", &self.user_id)
            .field("timezone", &self.timezone)
            .field("date", &self.date)
            .field("task", &self.task.name())
            .finish_non_exhaustive()
    }
}
