//! Read-only training data tools.

use async_trait::async_trait;
use chrono::Duration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stride_common::{AgentContext, CoachError, Result};

use super::{CoachTool, GET_HEALTH_METRICS, GET_WORKOUTS, ToolCollector, parse_args, schema_for};

const MAX_WINDOW_DAYS: u32 = 90;

/// Input for get_workouts.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct WorkoutsInput {
    /// Days before today to include (default 14, max 90)
    #[serde(default)]
    pub days_back: Option<u32>,

    /// Days after today to include (default 7, max 90)
    #[serde(default)]
    pub days_ahead: Option<u32>,
}

/// Input for get_health_metrics.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct HealthInput {
    /// Days of samples to return, counting back from today (default 7, max 90)
    #[serde(default)]
    pub days: Option<u32>,
}

fn window(field: &str, value: Option<u32>, default: u32) -> Result<i64> {
    let days = value.unwrap_or(default);
    if days > MAX_WINDOW_DAYS {
        return Err(CoachError::validation(
            field,
            format!("{days} exceeds the maximum of {MAX_WINDOW_DAYS}"),
        ));
    }
    Ok(i64::from(days))
}

pub struct GetWorkouts;

#[async_trait]
impl CoachTool for GetWorkouts {
    fn name(&self) -> &str {
        GET_WORKOUTS
    }

    fn description(&self) -> &str {
        "List the athlete's planned and completed workouts around today, with any recorded actuals."
    }

    fn input_schema(&self) -> Value {
        schema_for::<WorkoutsInput>()
    }

    async fn execute(
        &self,
        args: Value,
        ctx: &AgentContext,
        _collector: &ToolCollector,
    ) -> Result<String> {
        let input: WorkoutsInput = parse_args(self.name(), args)?;
        let back = window("days_back", input.days_back, 14)?;
        let ahead = window("days_ahead", input.days_ahead, 7)?;

        let workouts = ctx
            .store
            .workouts_between(
                &ctx.user_id,
                ctx.date - Duration::days(back),
                ctx.date + Duration::days(ahead),
            )
            .await?;
        Ok(serde_json::to_string(&workouts)?)
    }
}

pub struct GetHealthMetrics;

#[async_trait]
impl CoachTool for GetHealthMetrics {
    fn name(&self) -> &str {
        GET_HEALTH_METRICS
    }

    fn description(&self) -> &str {
        "Daily recovery metrics: resting HR, HRV, sleep, body battery, stress and steps."
    }

    fn input_schema(&self) -> Value {
        schema_for::<HealthInput>()
    }

    async fn execute(
        &self,
        args: Value,
        ctx: &AgentContext,
        _collector: &ToolCollector,
    ) -> Result<String> {
        let input: HealthInput = parse_args(self.name(), args)?;
        let days = window("days", input.days, 7)?;
        let samples = ctx
            .store
            .health_since(&ctx.user_id, ctx.date - Duration::days(days))
            .await?;
        Ok(serde_json::to_string(&samples)?)
    }
}
