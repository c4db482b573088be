//! Task kinds that select how an agent builds its prompts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::message::ChatTurn;

/// The unit of work an agent is asked to perform in one invocation.
///
/// Each kind carries its own payload; agents `match` on it exhaustively and
/// reject kinds they do not handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// No specific task; the agent gives a general status read.
    #[default]
    General,
    MorningBriefing,
    ReadinessCheck,
    Chat {
        message: String,
        #[serde(default)]
        history: Vec<ChatTurn>,
    },
    ActivityAnalysis {
        workout_id: String,
    },
    PlanAdjustment {
        workout_id: String,
    },
    RecoveryCheck {
        workout_id: String,
    },
    WeeklySummary {
        week_start: NaiveDate,
    },
    WeeklyReview {
        week_start: NaiveDate,
        /// Analyst summary of the week, when it was produced.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
}

impl TaskKind {
    /// Stable name used in logs and stage records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::MorningBriefing => "morning_briefing",
            Self::ReadinessCheck => "readiness_check",
            Self::Chat { .. } => "chat",
            Self::ActivityAnalysis { .. } => "activity_analysis",
            Self::PlanAdjustment { .. } => "plan_adjustment",
            Self::RecoveryCheck { .. } => "recovery_check",
            Self::WeeklySummary { .. } => "weekly_summary",
            Self::WeeklyReview { .. } => "weekly_review",
        }
    }

    pub fn chat(message: impl Into<String>, history: Vec<ChatTurn>) -> Self {
        Self::Chat {
            message: message.into(),
            history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let task = TaskKind::ActivityAnalysis {
            workout_id: "w1".into(),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"], "activity_analysis");
        assert_eq!(json["workout_id"], "w1");

        let back: TaskKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn chat_history_defaults_to_empty() {
        let task: TaskKind =
            serde_json::from_str(r#"{"kind":"chat","message":"how was my run?"}"#).unwrap();
        assert_eq!(task, TaskKind::chat("how was my run?", vec![]));
    }

    #[test]
    fn default_is_general() {
        assert_eq!(TaskKind::default().name(), "general");
    }
}
