//! Planner agent - plan adjustments and weekly plan review.

use stride_common::{AgentContext, Result, TaskKind};

use crate::prompt::{context_section, describe_workout, upcoming_section};
use crate::tools::{GET_WORKOUTS, POST_TO_WHITEBOARD, READ_WHITEBOARD};
use crate::traits::{AgentConfig, CoachAgent, unsupported};

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a training plan specialist. Your role is to:

1. Keep the plan aligned with the goal race and the current phase
2. Adjust upcoming sessions after missed, hard or unexpectedly easy days
3. Balance load progression against recovery signals
4. Explain every change in one sentence

Change as little as possible. Never stack two hard days.
Read the whiteboard for analyst insights and wellness alerts before changing anything.
Post each proposed change to the whiteboard as a plan entry.
"#;

pub struct PlannerAgent {
    config: AgentConfig,
}

impl PlannerAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(AgentConfig {
            id: "planner".into(),
            name: "Planner".into(),
            system_prompt: None,
            max_turns: None,
        })
    }
}

impl CoachAgent for PlannerAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        "Training plan structure, schedule changes and weekly plan review"
    }

    fn tools(&self) -> &[&'static str] {
        &[GET_WORKOUTS, READ_WHITEBOARD, POST_TO_WHITEBOARD]
    }

    fn max_turns(&self) -> Option<u32> {
        self.config.max_turns
    }

    fn system_prompt(&self, ctx: &AgentContext) -> Result<String> {
        let base = self.config.system_prompt.as_deref().unwrap_or(PLANNER_SYSTEM_PROMPT);
        Ok(format!("{base}\n{}", context_section(ctx)))
    }

    fn user_prompt(&self, ctx: &AgentContext) -> Result<String> {
        match &ctx.task {
            TaskKind::PlanAdjustment { workout_id } => {
                let session = ctx
                    .snapshot
                    .find_workout(workout_id)
                    .map(describe_workout)
                    .unwrap_or_else(|| format!("workout {workout_id}"));
                Ok(format!(
                    "I just completed: {session}. Does the coming week need adjusting?\n\n{}",
                    upcoming_section(ctx)
                ))
            }
            TaskKind::WeeklyReview {
                week_start,
                summary,
            } => {
                let mut prompt = format!(
                    "Review my plan for the week starting {week_start} and propose any \
                     changes for next week.\n\n{}",
                    upcoming_section(ctx)
                );
                if let Some(summary) = summary {
                    prompt.push_str("\n## Analyst summary of the week\n");
                    prompt.push_str(summary);
                    prompt.push('\n');
                }
                Ok(prompt)
            }
            task @ (TaskKind::General
            | TaskKind::MorningBriefing
            | TaskKind::ReadinessCheck
            | TaskKind::Chat { .. }
            | TaskKind::ActivityAnalysis { .. }
            | TaskKind::RecoveryCheck { .. }
            | TaskKind::WeeklySummary { .. }) => Err(unsupported(self.id(), task)),
        }
    }
}
