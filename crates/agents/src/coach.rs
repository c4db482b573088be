//! Coach agent - day-to-day training conversation and the morning briefing.

use stride_common::{AgentContext, Result, TaskKind};

use crate::prompt::{context_section, history_section, upcoming_section};
use crate::tools::{GET_WORKOUTS, POST_TO_WHITEBOARD, READ_WHITEBOARD};
use crate::traits::{AgentConfig, CoachAgent, unsupported};

const COACH_SYSTEM_PROMPT: &str = r#"You are an experienced endurance running coach. Your role is to:

1. Explain what today's session is for and how to execute it
2. Answer questions about training, pacing and race preparation
3. Adjust advice to the athlete's recovery and any active injuries
4. Keep the athlete motivated without pushing through warning signs

Be concise and specific. Prefer concrete paces, distances and durations.
Read the whiteboard before advising; other agents post their findings there.
Post a suggestion to the whiteboard when you recommend a change to the plan.
"#;

pub struct CoachAgentDef {
    config: AgentConfig,
}

impl CoachAgentDef {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(AgentConfig {
            id: "coach".into(),
            name: "Coach".into(),
            system_prompt: None,
            max_turns: None,
        })
    }
}

impl CoachAgent for CoachAgentDef {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        "Training questions, workout execution, pacing, race preparation and motivation"
    }

    fn tools(&self) -> &[&'static str] {
        &[READ_WHITEBOARD, POST_TO_WHITEBOARD, GET_WORKOUTS]
    }

    fn max_turns(&self) -> Option<u32> {
        self.config.max_turns
    }

    fn system_prompt(&self, ctx: &AgentContext) -> Result<String> {
        let base = self.config.system_prompt.as_deref().unwrap_or(COACH_SYSTEM_PROMPT);
        Ok(format!("{base}\n{}", context_section(ctx)))
    }

    fn user_prompt(&self, ctx: &AgentContext) -> Result<String> {
        match &ctx.task {
            TaskKind::General => Ok("Give me a short status read on my training right now.".into()),
            TaskKind::MorningBriefing => Ok(format!(
                "Write my morning briefing for {}: today's session and how to run it, \
                 anything from the whiteboard I should know, and one focus for the day.\n\n{}",
                ctx.date,
                upcoming_section(ctx)
            )),
            TaskKind::Chat { message, history } => {
                Ok(format!("{}\n{message}", history_section(history)).trim_start().to_string())
            }
            task @ (TaskKind::ReadinessCheck
            | TaskKind::ActivityAnalysis { .. }
            | TaskKind::PlanAdjustment { .. }
            | TaskKind::RecoveryCheck { .. }
            | TaskKind::WeeklySummary { .. }
            | TaskKind::WeeklyReview { .. }) => Err(unsupported(self.id(), task)),
        }
    }
}
