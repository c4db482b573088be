//! Activity sync: reconcile the latest device activity with the plan.
//!
//! One sync picks the most recent matching activity for a date, derives a
//! stable external id from it, and then either returns the already-linked
//! record, merges the actuals into a planned record, or creates a new one.
//!
//! The existence check and the insert are two separate store calls. Two
//! concurrent syncs of the same new activity can both pass the check and
//! create two records.

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stride_common::{
    Actuals, CoachError, EntryType, Logger, NewEntry, NewWorkout, Result, Split, Store, Workout,
    WorkoutStatus,
};
use stride_whiteboard::Whiteboard;
use tracing::{Instrument, debug, info, warn};

use crate::context::today_in;
use crate::device::{DeviceActivity, DeviceClient};

/// Author recorded on workouts and notes the sync creates.
pub const SYNC_AUTHOR: &str = "activity_sync";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How many recent device activities to scan.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Activity kinds considered when no explicit kind is requested.
    #[serde(default = "default_activity_kinds")]
    pub activity_kinds: Vec<String>,
    /// Post an observation to the whiteboard after a created or updated sync.
    #[serde(default = "default_post_to_whiteboard")]
    pub post_to_whiteboard: bool,
}

fn default_window() -> usize {
    20
}

fn default_activity_kinds() -> Vec<String> {
    vec![
        "running".into(),
        "trail_running".into(),
        "treadmill_running".into(),
    ]
}

fn default_post_to_whiteboard() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            activity_kinds: default_activity_kinds(),
            post_to_whiteboard: default_post_to_whiteboard(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Target date; defaults to today in the user's timezone.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Restrict to one activity kind instead of the configured set.
    #[serde(default)]
    pub activity_kind: Option<String>,
    /// Re-merge the activity even when it is already linked to a record.
    #[serde(default)]
    pub force_resync: bool,
    /// Merge into this workout regardless of its date.
    #[serde(default)]
    pub target_workout_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
    AlreadySynced,
    NoActivity,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::AlreadySynced => "already_synced",
            Self::NoActivity => "no_activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&CoachError> for SyncFailure {
    fn from(e: &CoachError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

/// Result of one sync. Failures are reported here rather than returned as
/// errors so callers can tell "nothing to sync yet" apart from "sync broke".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SyncAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Workout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncFailure>,
}

impl SyncOutcome {
    fn done(action: SyncAction, record: Option<Workout>) -> Self {
        Self {
            success: true,
            action: Some(action),
            record,
            error: None,
        }
    }

    fn failed(error: &CoachError) -> Self {
        Self {
            success: false,
            action: None,
            record: None,
            error: Some(error.into()),
        }
    }
}

pub struct ActivitySync {
    device: Arc<dyn DeviceClient>,
    store: Arc<dyn Store>,
    whiteboard: Option<Whiteboard>,
    config: SyncConfig,
    log: Logger,
}

impl ActivitySync {
    pub fn new(
        device: Arc<dyn DeviceClient>,
        store: Arc<dyn Store>,
        config: SyncConfig,
        log: Logger,
    ) -> Self {
        Self {
            device,
            store,
            whiteboard: None,
            config,
            log,
        }
    }

    /// Post an observation for each created or updated sync.
    pub fn with_whiteboard(mut self, whiteboard: Whiteboard) -> Self {
        self.whiteboard = Some(whiteboard);
        self
    }

    /// Sync the latest matching activity for the options' date.
    ///
    /// The device session is always closed, whatever the outcome.
    pub async fn sync(&self, user_id: &str, timezone: Tz, options: SyncOptions) -> SyncOutcome {
        let span = self.log.with_user(user_id).span();
        async {
            let date = options.date.unwrap_or_else(|| today_in(timezone));

            let result = match self.device.connect().await {
                Ok(()) => self.reconcile(user_id, date, &options).await,
                Err(e) => Err(e),
            };

            if let Err(e) = self.device.disconnect().await {
                warn!(error = %e, "Device disconnect failed");
            }

            match result {
                Ok((action, record)) => {
                    info!(
                        date = %date,
                        action = action.as_str(),
                        workout_id = record.as_ref().map(|w| w.id.as_str()).unwrap_or(""),
                        "Activity sync finished"
                    );
                    if matches!(action, SyncAction::Created | SyncAction::Updated) {
                        if let Some(record) = &record {
                            self.post_note(record, action).await;
                        }
                    }
                    SyncOutcome::done(action, record)
                }
                Err(e) => {
                    warn!(date = %date, code = e.code(), error = %e, "Activity sync failed");
                    SyncOutcome::failed(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn reconcile(
        &self,
        user_id: &str,
        date: NaiveDate,
        options: &SyncOptions,
    ) -> Result<(SyncAction, Option<Workout>)> {
        let activities = self.device.recent_activities(self.config.window).await?;
        let Some(activity) = self.select_activity(activities, date, options) else {
            debug!(date = %date, "No matching device activity");
            return Ok((SyncAction::NoActivity, None));
        };

        let external_id = format!("{}:{}", self.device.provider(), activity.activity_id);
        let linked = self.store.workout_by_external_id(user_id, &external_id).await?;

        if !options.force_resync {
            if let Some(existing) = linked {
                debug!(external_id = %external_id, workout_id = %existing.id, "Activity already synced");
                return Ok((SyncAction::AlreadySynced, Some(existing)));
            }
        }

        let target = match &options.target_workout_id {
            Some(id) => {
                let target = self
                    .store
                    .workout(user_id, id)
                    .await?
                    .ok_or_else(|| CoachError::not_found("workout", id))?;
                // The store clears the old record's link in the same write.
                if let Some(previous) = linked.as_ref().filter(|w| w.id != target.id) {
                    info!(
                        external_id = %external_id,
                        from = %previous.id,
                        to = %target.id,
                        "Moving activity link to target workout"
                    );
                }
                Some(target)
            }
            None => match linked {
                Some(existing) => Some(existing),
                None => self.planned_match(user_id, date, &external_id).await?,
            },
        };

        let actuals = Actuals {
            duration_s: activity.duration_s,
            distance_km: activity.distance_m / 1000.0,
            avg_hr: activity.avg_hr,
            max_hr: activity.max_hr,
            splits: self.fetch_splits(&activity.activity_id).await,
        };

        match target {
            Some(mut workout) => {
                workout.status = WorkoutStatus::Completed;
                workout.actuals = Some(actuals);
                workout.external_id = Some(external_id);
                let updated = self.store.update_workout(&workout).await?;
                Ok((SyncAction::Updated, Some(updated)))
            }
            None => {
                let created = self
                    .store
                    .insert_workout(NewWorkout {
                        user_id: user_id.to_string(),
                        author: SYNC_AUTHOR.to_string(),
                        date,
                        kind: activity.kind,
                        title: activity.name,
                        status: WorkoutStatus::Completed,
                        prescribed: Default::default(),
                        actuals: Some(actuals),
                        external_id: Some(external_id),
                    })
                    .await?;
                Ok((SyncAction::Created, Some(created)))
            }
        }
    }

    /// Most recent activity on `date` of an accepted kind.
    fn select_activity(
        &self,
        activities: Vec<DeviceActivity>,
        date: NaiveDate,
        options: &SyncOptions,
    ) -> Option<DeviceActivity> {
        activities
            .into_iter()
            .filter(|a| a.start_local.date() == date)
            .filter(|a| match &options.activity_kind {
                Some(kind) => a.kind == *kind,
                None => self.config.activity_kinds.iter().any(|k| *k == a.kind),
            })
            .max_by_key(|a| a.start_local)
    }

    /// A workout on `date` to merge into. Unlinked records win; a record
    /// linked to this same activity is the fallback. Records linked to a
    /// different activity are never touched.
    async fn planned_match(
        &self,
        user_id: &str,
        date: NaiveDate,
        external_id: &str,
    ) -> Result<Option<Workout>> {
        let candidates = self.store.workouts_on(user_id, date).await?;
        let unlinked = candidates
            .iter()
            .filter(|w| w.external_id.is_none())
            .min_by_key(|w| w.status != WorkoutStatus::Planned)
            .cloned();
        Ok(unlinked.or_else(|| {
            candidates
                .into_iter()
                .find(|w| w.external_id.as_deref() == Some(external_id))
        }))
    }

    /// Lap data from the splits endpoint, falling back to the detail view.
    async fn fetch_splits(&self, activity_id: &str) -> Vec<Split> {
        match self.device.activity_splits(activity_id).await {
            Ok(splits) if !splits.is_empty() => return splits,
            Ok(_) => debug!(activity_id = %activity_id, "Splits endpoint empty; trying detail"),
            Err(e) => debug!(activity_id = %activity_id, error = %e, "Splits endpoint failed; trying detail"),
        }
        match self.device.activity_detail(activity_id).await {
            Ok(detail) => detail.embedded_splits(),
            Err(e) => {
                warn!(activity_id = %activity_id, error = %e, "No split data available");
                Vec::new()
            }
        }
    }

    async fn post_note(&self, record: &Workout, action: SyncAction) {
        let Some(whiteboard) = &self.whiteboard else {
            return;
        };
        if !self.config.post_to_whiteboard {
            return;
        }

        let entry = NewEntry::new(
            &record.user_id,
            SYNC_AUTHOR,
            EntryType::Observation,
            describe(record),
        )
        .with_payload(json!({
            "workout_id": record.id,
            "external_id": record.external_id,
            "action": action.as_str(),
        }))
        .with_tags(vec!["activity".into(), "sync".into()])
        .for_date(record.date);

        if let Err(e) = whiteboard.post(entry).await {
            warn!(workout_id = %record.id, error = %e, "Failed to post sync note");
        }
    }
}

fn describe(record: &Workout) -> String {
    let Some(actuals) = &record.actuals else {
        return format!("Synced {}", record.title);
    };
    let mut text = format!(
        "Synced {}: {:.2} km in {}",
        record.title,
        actuals.distance_km,
        format_duration(actuals.duration_s)
    );
    if let Some(pace) = actuals.pace_s_per_km() {
        text.push_str(&format!(" ({}/km)", format_duration(pace)));
    }
    if let Some(hr) = actuals.avg_hr {
        text.push_str(&format!(", avg HR {hr}"));
    }
    text
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
