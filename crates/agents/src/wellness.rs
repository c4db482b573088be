//! Wellness agent - recovery, sleep, stress and injury management.

use stride_common::{AgentContext, Result, TaskKind};

use crate::prompt::{context_section, describe_workout, history_section};
use crate::tools::{GET_HEALTH_METRICS, POST_TO_WHITEBOARD, READ_WHITEBOARD};
use crate::traits::{AgentConfig, CoachAgent, unsupported};

const WELLNESS_SYSTEM_PROMPT: &str = r#"You are a sports recovery and wellbeing specialist. Your role is to:

1. Judge readiness to train from resting HR, HRV, sleep and body battery
2. Spot accumulating fatigue and illness or injury warning signs
3. Advise on sleep, stress, easy days and return from injury
4. Flag anything that should change today's training

Compare today's metrics with the athlete's own recent baseline, not population norms.
Post an alert to the whiteboard when training should be reduced or skipped.
"#;

pub struct WellnessAgent {
    config: AgentConfig,
}

impl WellnessAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(AgentConfig {
            id: "wellness".into(),
            name: "Wellness".into(),
            system_prompt: None,
            max_turns: None,
        })
    }
}

impl CoachAgent for WellnessAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        "Recovery, sleep, stress, fatigue, soreness, illness and injuries"
    }

    fn tools(&self) -> &[&'static str] {
        &[GET_HEALTH_METRICS, READ_WHITEBOARD, POST_TO_WHITEBOARD]
    }

    fn max_turns(&self) -> Option<u32> {
        self.config.max_turns
    }

    fn system_prompt(&self, ctx: &AgentContext) -> Result<String> {
        let base = self.config.system_prompt.as_deref().unwrap_or(WELLNESS_SYSTEM_PROMPT);
        Ok(format!("{base}\n{}", context_section(ctx)))
    }

    fn user_prompt(&self, ctx: &AgentContext) -> Result<String> {
        match &ctx.task {
            TaskKind::General => Ok("How is my recovery looking?".into()),
            TaskKind::ReadinessCheck => Ok(format!(
                "Assess my readiness to train on {}. Compare last night's metrics with my \
                 recent baseline and say whether today's session should go ahead as planned, \
                 be eased off, or be replaced with rest.",
                ctx.date
            )),
            TaskKind::RecoveryCheck { workout_id } => {
                let session = ctx
                    .snapshot
                    .find_workout(workout_id)
                    .map(describe_workout)
                    .unwrap_or_else(|| format!("workout {workout_id}"));
                Ok(format!(
                    "I just finished: {session}. What should I do to recover before the next \
                     session, and is there anything in my metrics to watch?"
                ))
            }
            TaskKind::Chat { message, history } => {
                Ok(format!("{}\n{message}", history_section(history)).trim_start().to_string())
            }
            task @ (TaskKind::MorningBriefing
            | TaskKind::ActivityAnalysis { .. }
            | TaskKind::PlanAdjustment { .. }
            | TaskKind::WeeklySummary { .. }
            | TaskKind::WeeklyReview { .. }) => Err(unsupported(self.id(), task)),
        }
    }
}
