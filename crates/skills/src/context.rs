//! Context loader.
//!
//! Gathers everything a pipeline run needs in one concurrent batch so agents
//! never have to fetch data mid-conversation.

use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use stride_common::{AgentContext, ContextSnapshot, Logger, Result, Store};
use stride_whiteboard::{Whiteboard, render_digest};
use tracing::{Instrument, debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Days of health samples to load, counting back from the target date.
    #[serde(default = "default_health_days")]
    pub health_days: i64,
    /// Days of completed history before the target date.
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,
    /// Days of planned workouts after the target date.
    #[serde(default = "default_upcoming_days")]
    pub upcoming_days: i64,
}

fn default_health_days() -> i64 {
    7
}

fn default_recent_days() -> i64 {
    14
}

fn default_upcoming_days() -> i64 {
    7
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            health_days: default_health_days(),
            recent_days: default_recent_days(),
            upcoming_days: default_upcoming_days(),
        }
    }
}

/// Today's date in `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

pub struct ContextLoader {
    store: Arc<dyn Store>,
    whiteboard: Whiteboard,
    config: ContextConfig,
    log: Logger,
}

impl ContextLoader {
    pub fn new(
        store: Arc<dyn Store>,
        whiteboard: Whiteboard,
        config: ContextConfig,
        log: Logger,
    ) -> Self {
        Self {
            store,
            whiteboard,
            config,
            log,
        }
    }

    /// Load the context for today in the user's timezone.
    pub async fn load(&self, user_id: &str, timezone: Tz) -> Result<AgentContext> {
        self.load_at(user_id, timezone, today_in(timezone)).await
    }

    /// Load the context for an explicit target date.
    ///
    /// Workouts and the plan are required: a store failure there fails the
    /// load. Health samples, injuries and whiteboard entries are optional and
    /// fall back to empty when their read fails.
    pub async fn load_at(
        &self,
        user_id: &str,
        timezone: Tz,
        date: NaiveDate,
    ) -> Result<AgentContext> {
        let span = self.log.with_user(user_id).span();
        async {
            let store = &self.store;
            let c = &self.config;

            let (health, today, upcoming, recent, plan, whiteboard, injuries) = tokio::join!(
                optional("health", store.health_since(user_id, date - Duration::days(c.health_days))),
                store.workouts_on(user_id, date),
                store.workouts_between(
                    user_id,
                    date + Duration::days(1),
                    date + Duration::days(c.upcoming_days),
                ),
                store.workouts_between(
                    user_id,
                    date - Duration::days(c.recent_days),
                    date - Duration::days(1),
                ),
                store.active_plan(user_id),
                self.whiteboard.recent(user_id),
                optional("injuries", store.active_injuries(user_id, date)),
            );

            let whiteboard_digest =
                render_digest(&whiteboard, self.whiteboard.config().digest_tokens);
            let snapshot = ContextSnapshot {
                health,
                today: today?,
                upcoming: upcoming?,
                recent: recent?,
                plan: plan?.map(|p| p.status_on(date)),
                whiteboard,
                whiteboard_digest,
                injuries,
            };

            debug!(
                date = %date,
                health = snapshot.health.len(),
                today = snapshot.today.len(),
                upcoming = snapshot.upcoming.len(),
                recent = snapshot.recent.len(),
                has_plan = snapshot.plan.is_some(),
                entries = snapshot.whiteboard.len(),
                injuries = snapshot.injuries.len(),
                "Loaded context"
            );

            Ok(AgentContext::new(
                user_id,
                timezone,
                date,
                snapshot,
                Arc::clone(&self.store),
            ))
        }
        .instrument(span)
        .await
    }
}

/// Await an optional read, substituting an empty value on failure.
async fn optional<T, F>(source: &'static str, read: F) -> T
where
    T: Default,
    F: Future<Output = Result<T>>,
{
    match read.await {
        Ok(value) => value,
        Err(e) => {
            warn!(source = source, error = %e, "Optional context read failed; using empty value");
            T::default()
        }
    }
}
