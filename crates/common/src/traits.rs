//! The backing-store abstraction.
//!
//! Defined here so the skills, whiteboard and agent crates can all read and
//! write through it without depending on a concrete database.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::Result;
use crate::entry::{EntryFilter, NewEntry, WhiteboardEntry};
use crate::model::{HealthSample, Injury, NewWorkout, TrainingPlan, Workout};

/// Row-level reads and writes, always scoped by user id.
///
/// Implementations return empty collections or `None` for "no rows"; an
/// `Err` means the store itself failed. There are no cross-call transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Health samples dated on or after `from`, oldest first.
    async fn health_since(&self, user_id: &str, from: NaiveDate) -> Result<Vec<HealthSample>>;

    /// Insert or replace the sample for `(user_id, date)`.
    async fn upsert_health(&self, sample: &HealthSample) -> Result<()>;

    /// Workouts dated within `[from, to]`, ordered by date.
    async fn workouts_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Workout>>;

    async fn workouts_on(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Workout>> {
        self.workouts_between(user_id, date, date).await
    }

    async fn workout(&self, user_id: &str, id: &str) -> Result<Option<Workout>>;

    async fn workout_by_external_id(
        &self,
        user_id: &str,
        external_id: &str,
    ) -> Result<Option<Workout>>;

    async fn insert_workout(&self, workout: NewWorkout) -> Result<Workout>;

    /// Persist changes to an existing workout, returning the stored row.
    /// Fails with `NotFound` when no row matches `(user_id, id)`.
    ///
    /// An external id belongs to at most one workout per user: setting it
    /// here clears it from any other workout in the same write.
    async fn update_workout(&self, workout: &Workout) -> Result<Workout>;

    async fn active_plan(&self, user_id: &str) -> Result<Option<TrainingPlan>>;

    async fn insert_plan(&self, plan: &TrainingPlan) -> Result<()>;

    /// Injuries active on `date`.
    async fn active_injuries(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Injury>>;

    async fn insert_injury(&self, injury: &Injury) -> Result<()>;

    async fn insert_entry(&self, entry: NewEntry) -> Result<WhiteboardEntry>;

    /// Entries matching `filter`, newest first.
    async fn query_entries(
        &self,
        user_id: &str,
        filter: &EntryFilter,
    ) -> Result<Vec<WhiteboardEntry>>;
}
