//! Analyst agent - workout and weekly training analysis.

use chrono::Duration;
use stride_common::{AgentContext, Result, TaskKind};

use crate::prompt::{context_section, describe_workout, recent_section};
use crate::tools::{GET_HEALTH_METRICS, GET_WORKOUTS, POST_TO_WHITEBOARD};
use crate::traits::{AgentConfig, CoachAgent, unsupported};

const ANALYST_SYSTEM_PROMPT: &str = r#"You are a running performance analyst. Your role is to:

1. Compare what was prescribed with what was actually run
2. Read splits for pacing discipline, fade and heart-rate drift
3. Track load and consistency across the week
4. Turn the numbers into two or three plain-language insights

Be precise about numbers and honest about what the data cannot show.
Post each key insight to the whiteboard so the planner and coach can use it.
"#;

pub struct AnalystAgent {
    config: AgentConfig,
}

impl AnalystAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(AgentConfig {
            id: "analyst".into(),
            name: "Analyst".into(),
            system_prompt: None,
            max_turns: None,
        })
    }
}

impl CoachAgent for AnalystAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        "Post-workout and weekly analysis of pace, splits, heart rate and load"
    }

    fn tools(&self) -> &[&'static str] {
        &[GET_WORKOUTS, GET_HEALTH_METRICS, POST_TO_WHITEBOARD]
    }

    fn max_turns(&self) -> Option<u32> {
        self.config.max_turns
    }

    fn system_prompt(&self, ctx: &AgentContext) -> Result<String> {
        let base = self.config.system_prompt.as_deref().unwrap_or(ANALYST_SYSTEM_PROMPT);
        Ok(format!("{base}\n{}", context_section(ctx)))
    }

    fn user_prompt(&self, ctx: &AgentContext) -> Result<String> {
        match &ctx.task {
            TaskKind::General => Ok(format!(
                "Summarise how my training has gone recently.\n\n{}",
                recent_section(ctx)
            )),
            TaskKind::ActivityAnalysis { workout_id } => {
                let workout = ctx.snapshot.find_workout(workout_id);
                let mut prompt = match workout {
                    Some(w) => format!("Analyse this session: {}", describe_workout(w)),
                    None => format!("Analyse workout {workout_id}; fetch it with get_workouts."),
                };
                if let Some(splits) = workout
                    .and_then(|w| w.actuals.as_ref())
                    .map(|a| &a.splits)
                    .filter(|s| !s.is_empty())
                {
                    prompt.push_str("\n\nSplits:\n");
                    for split in splits {
                        let pace = split
                            .pace_s_per_km()
                            .map(|p| format!("{}:{:02}/km", p as u64 / 60, p as u64 % 60))
                            .unwrap_or_else(|| "-".into());
                        prompt.push_str(&format!(
                            "- #{} {:.0} m, {pace}{}\n",
                            split.index,
                            split.distance_m,
                            split.avg_hr.map(|hr| format!(", HR {hr}")).unwrap_or_default()
                        ));
                    }
                }
                Ok(prompt)
            }
            TaskKind::WeeklySummary { week_start } => Ok(format!(
                "Summarise my training week from {week_start} to {}: volume, key sessions, \
                 what went well and what did not.\n\n{}",
                *week_start + Duration::days(6),
                recent_section(ctx)
            )),
            task @ (TaskKind::MorningBriefing
            | TaskKind::ReadinessCheck
            | TaskKind::Chat { .. }
            | TaskKind::PlanAdjustment { .. }
            | TaskKind::RecoveryCheck { .. }
            | TaskKind::WeeklyReview { .. }) => Err(unsupported(self.id(), task)),
        }
    }
}
