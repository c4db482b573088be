//! Domain records persisted in the backing store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a workout record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutStatus {
    Planned,
    Completed,
    Skipped,
}

impl WorkoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(Self::Planned),
            "completed" => Some(Self::Completed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One lap or split reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub index: u32,
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_hr: Option<u32>,
}

impl Split {
    /// Pace in seconds per kilometre, if the split covered any distance.
    pub fn pace_s_per_km(&self) -> Option<f64> {
        (self.distance_m > 0.0).then(|| self.duration_s / (self.distance_m / 1000.0))
    }
}

/// What the plan asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    /// Target pace, free-form ("5:10/km", "easy").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// What the device measured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuals {
    pub duration_s: f64,
    pub distance_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_hr: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hr: Option<u32>,
    #[serde(default)]
    pub splits: Vec<Split>,
}

impl Actuals {
    pub fn pace_s_per_km(&self) -> Option<f64> {
        (self.distance_km > 0.0).then(|| self.duration_s / self.distance_km)
    }
}

/// A planned or completed workout. A synced workout is one with an
/// `external_id` and `actuals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub id: String,
    pub user_id: String,
    /// Creator of the record (planner agent, `activity_sync`, the user).
    pub author: String,
    pub date: NaiveDate,
    /// Activity kind, e.g. "running", "cycling".
    pub kind: String,
    pub title: String,
    pub status: WorkoutStatus,
    #[serde(default)]
    pub prescribed: Prescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actuals: Option<Actuals>,
    /// Provider-qualified device activity id, unique per user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkout {
    pub user_id: String,
    pub author: String,
    pub date: NaiveDate,
    pub kind: String,
    pub title: String,
    pub status: WorkoutStatus,
    #[serde(default)]
    pub prescribed: Prescription,
    #[serde(default)]
    pub actuals: Option<Actuals>,
    #[serde(default)]
    pub external_id: Option<String>,
}

impl NewWorkout {
    pub fn planned(
        user_id: impl Into<String>,
        date: NaiveDate,
        kind: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            author: "planner".into(),
            date,
            kind: kind.into(),
            title: title.into(),
            status: WorkoutStatus::Planned,
            prescribed: Prescription::default(),
            actuals: None,
            external_id: None,
        }
    }

    pub fn with_prescription(mut self, prescribed: Prescription) -> Self {
        self.prescribed = prescribed;
        self
    }
}

/// One day of recovery metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resting_hr: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_battery: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
}

impl HealthSample {
    pub fn is_empty(&self) -> bool {
        self.resting_hr.is_none()
            && self.hrv_ms.is_none()
            && self.sleep_hours.is_none()
            && self.sleep_score.is_none()
            && self.body_battery.is_none()
            && self.stress.is_none()
            && self.steps.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPhase {
    pub name: String,
    pub weeks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
    pub active: bool,
}

impl TrainingPlan {
    pub fn total_weeks(&self) -> u32 {
        let days = (self.end_date - self.start_date).num_days().max(0) as u32;
        days.div_ceil(7).max(1)
    }

    /// Position of `date` within the plan: 1-based week (clamped to the plan)
    /// and the phase that week falls in.
    pub fn status_on(&self, date: NaiveDate) -> PlanStatus {
        let total_weeks = self.total_weeks();
        let elapsed = (date - self.start_date).num_days().max(0) as u32;
        let current_week = (elapsed / 7 + 1).min(total_weeks);

        let mut cumulative = 0;
        let mut phase = None;
        for p in &self.phases {
            cumulative += p.weeks;
            if current_week <= cumulative {
                phase = Some(p.name.clone());
                break;
            }
        }

        PlanStatus {
            plan: self.clone(),
            current_week,
            total_weeks,
            phase,
        }
    }
}

/// An active plan together with where the user is in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStatus {
    pub plan: TrainingPlan,
    pub current_week: u32,
    pub total_weeks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injury {
    pub id: String,
    pub user_id: String,
    pub area: String,
    /// 1 (niggle) to 5 (cannot train).
    pub severity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub started_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_on: Option<NaiveDate>,
}

impl Injury {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.started_on <= date && self.resolved_on.is_none_or(|r| r > date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn plan() -> TrainingPlan {
        TrainingPlan {
            id: "p1".into(),
            user_id: "u1".into(),
            name: "Spring marathon".into(),
            goal: Some("sub 3:30".into()),
            start_date: date(2026, 1, 5),
            end_date: date(2026, 3, 30),
            phases: vec![
                PlanPhase { name: "base".into(), weeks: 4 },
                PlanPhase { name: "build".into(), weeks: 6 },
                PlanPhase { name: "taper".into(), weeks: 3 },
            ],
            active: true,
        }
    }

    #[test]
    fn plan_status_computes_week_and_phase() {
        let status = plan().status_on(date(2026, 1, 5));
        assert_eq!(status.current_week, 1);
        assert_eq!(status.phase.as_deref(), Some("base"));

        let status = plan().status_on(date(2026, 2, 2));
        assert_eq!(status.current_week, 5);
        assert_eq!(status.phase.as_deref(), Some("build"));
    }

    #[test]
    fn plan_status_clamps_outside_the_plan() {
        let p = plan();
        assert_eq!(p.status_on(date(2025, 12, 1)).current_week, 1);
        let late = p.status_on(date(2026, 6, 1));
        assert_eq!(late.current_week, p.total_weeks());
        assert_eq!(late.phase.as_deref(), Some("taper"));
    }

    #[test]
    fn injury_activity_window() {
        let injury = Injury {
            id: "i1".into(),
            user_id: "u1".into(),
            area: "achilles".into(),
            severity: 2,
            notes: None,
            started_on: date(2026, 2, 1),
            resolved_on: Some(date(2026, 2, 10)),
        };
        assert!(!injury.is_active_on(date(2026, 1, 31)));
        assert!(injury.is_active_on(date(2026, 2, 5)));
        assert!(!injury.is_active_on(date(2026, 2, 10)));
    }

    #[test]
    fn split_pace() {
        let split = Split { index: 1, distance_m: 1000.0, duration_s: 300.0, avg_hr: None };
        assert_eq!(split.pace_s_per_km(), Some(300.0));
        let empty = Split { index: 2, distance_m: 0.0, duration_s: 30.0, avg_hr: None };
        assert_eq!(empty.pace_s_per_km(), None);
    }
}
