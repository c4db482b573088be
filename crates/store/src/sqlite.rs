//! SQLite store.
//!
//! One connection behind a mutex; every call runs on the blocking pool.
//! Dates are stored as `YYYY-MM-DD`, instants as fixed-width RFC 3339 UTC so
//! both compare correctly as text. Nested values (prescription, actuals,
//! plan phases, entry payload and tags) are stored as JSON.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use stride_common::{
    CoachError, EntryFilter, EntryType, HealthSample, Injury, NewEntry, NewWorkout, Result,
    Store, TrainingPlan, Visibility, WhiteboardEntry, Workout, WorkoutStatus,
};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS health_samples (
    user_id TEXT NOT NULL,
    date TEXT NOT NULL,
    resting_hr INTEGER,
    hrv_ms REAL,
    sleep_hours REAL,
    sleep_score INTEGER,
    body_battery INTEGER,
    stress INTEGER,
    steps INTEGER,
    PRIMARY KEY (user_id, date)
);

CREATE TABLE IF NOT EXISTS workouts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    author TEXT NOT NULL,
    date TEXT NOT NULL,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    status TEXT NOT NULL,
    prescribed TEXT NOT NULL DEFAULT '{}',
    actuals TEXT,
    external_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workouts_user_date ON workouts(user_id, date);
CREATE INDEX IF NOT EXISTS idx_workouts_external ON workouts(user_id, external_id);

CREATE TABLE IF NOT EXISTS training_plans (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    goal TEXT,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    phases TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS injuries (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    area TEXT NOT NULL,
    severity INTEGER NOT NULL,
    notes TEXT,
    started_on TEXT NOT NULL,
    resolved_on TEXT
);

CREATE TABLE IF NOT EXISTS whiteboard_entries (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    author TEXT NOT NULL,
    entry_type TEXT NOT NULL,
    content TEXT NOT NULL,
    payload TEXT,
    priority INTEGER NOT NULL,
    visibility TEXT NOT NULL,
    requires_response INTEGER NOT NULL DEFAULT 0,
    tags TEXT NOT NULL DEFAULT '[]',
    expires_at TEXT,
    context_date TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_user_created ON whiteboard_entries(user_id, created_at DESC);
";

fn db_err(e: rusqlite::Error) -> CoachError {
    CoachError::Store(e.to_string())
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoachError::Store(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| CoachError::Store(format!("bad date {raw:?}: {e}")))
}

fn parse_opt_date(raw: Option<String>) -> Result<Option<NaiveDate>> {
    raw.as_deref().map(parse_date).transpose()
}

/// SQLite-backed [`Store`].
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`; `:memory:` opens an
    /// in-memory database. Creates the tables on first use.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!(path = %path.display(), "Opened store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| CoachError::Store(format!("store task failed: {e}")))?
    }
}

struct WorkoutRow {
    id: String,
    user_id: String,
    author: String,
    date: String,
    kind: String,
    title: String,
    status: String,
    prescribed: String,
    actuals: Option<String>,
    external_id: Option<String>,
    created_at: String,
    updated_at: String,
}

const WORKOUT_COLUMNS: &str = "id, user_id, author, date, kind, title, status, prescribed, \
     actuals, external_id, created_at, updated_at";

impl WorkoutRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            author: row.get(2)?,
            date: row.get(3)?,
            kind: row.get(4)?,
            title: row.get(5)?,
            status: row.get(6)?,
            prescribed: row.get(7)?,
            actuals: row.get(8)?,
            external_id: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_workout(self) -> Result<Workout> {
        let status = WorkoutStatus::parse(&self.status)
            .ok_or_else(|| CoachError::Store(format!("bad workout status {:?}", self.status)))?;
        Ok(Workout {
            date: parse_date(&self.date)?,
            status,
            prescribed: serde_json::from_str(&self.prescribed)?,
            actuals: self
                .actuals
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            id: self.id,
            user_id: self.user_id,
            author: self.author,
            kind: self.kind,
            title: self.title,
            external_id: self.external_id,
        })
    }
}

fn query_workouts(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Workout>> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params, WorkoutRow::from_row)
        .map_err(db_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_err)?;
    rows.into_iter().map(WorkoutRow::into_workout).collect()
}

fn fetch_workout(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Workout>> {
    let sql = format!("SELECT {WORKOUT_COLUMNS} FROM workouts WHERE user_id = ?1 AND id = ?2");
    conn.query_row(&sql, params![user_id, id], WorkoutRow::from_row)
        .optional()
        .map_err(db_err)?
        .map(WorkoutRow::into_workout)
        .transpose()
}

struct EntryRow {
    id: String,
    user_id: String,
    author: String,
    entry_type: String,
    content: String,
    payload: Option<String>,
    priority: u8,
    visibility: String,
    requires_response: bool,
    tags: String,
    expires_at: Option<String>,
    context_date: Option<String>,
    created_at: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            author: row.get(2)?,
            entry_type: row.get(3)?,
            content: row.get(4)?,
            payload: row.get(5)?,
            priority: row.get(6)?,
            visibility: row.get(7)?,
            requires_response: row.get(8)?,
            tags: row.get(9)?,
            expires_at: row.get(10)?,
            context_date: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_entry(self) -> Result<WhiteboardEntry> {
        let entry_type = EntryType::parse(&self.entry_type)
            .ok_or_else(|| CoachError::Store(format!("bad entry type {:?}", self.entry_type)))?;
        let visibility = Visibility::parse(&self.visibility)
            .ok_or_else(|| CoachError::Store(format!("bad visibility {:?}", self.visibility)))?;
        Ok(WhiteboardEntry {
            entry_type,
            visibility,
            payload: match self.payload.as_deref() {
                Some(raw) => serde_json::from_str(raw)?,
                None => serde_json::Value::Null,
            },
            tags: serde_json::from_str(&self.tags)?,
            expires_at: self.expires_at.as_deref().map(parse_ts).transpose()?,
            context_date: parse_opt_date(self.context_date)?,
            created_at: parse_ts(&self.created_at)?,
            id: self.id,
            user_id: self.user_id,
            author: self.author,
            content: self.content,
            priority: self.priority,
            requires_response: self.requires_response,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn health_since(&self, user_id: &str, from: NaiveDate) -> Result<Vec<HealthSample>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT date, resting_hr, hrv_ms, sleep_hours, sleep_score, body_battery, \
                     stress, steps FROM health_samples WHERE user_id = ?1 AND date >= ?2 \
                     ORDER BY date ASC",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![user_id, from.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        HealthSample {
                            user_id: user_id.clone(),
                            date: NaiveDate::MIN,
                            resting_hr: row.get(1)?,
                            hrv_ms: row.get(2)?,
                            sleep_hours: row.get(3)?,
                            sleep_score: row.get(4)?,
                            body_battery: row.get(5)?,
                            stress: row.get(6)?,
                            steps: row.get(7)?,
                        },
                    ))
                })
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;

            rows.into_iter()
                .map(|(date, sample)| {
                    Ok(HealthSample {
                        date: parse_date(&date)?,
                        ..sample
                    })
                })
                .collect()
        })
        .await
    }

    async fn upsert_health(&self, sample: &HealthSample) -> Result<()> {
        let s = sample.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO health_samples (user_id, date, resting_hr, hrv_ms, sleep_hours, \
                 sleep_score, body_battery, stress, steps) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(user_id, date) DO UPDATE SET \
                 resting_hr = excluded.resting_hr, hrv_ms = excluded.hrv_ms, \
                 sleep_hours = excluded.sleep_hours, sleep_score = excluded.sleep_score, \
                 body_battery = excluded.body_battery, stress = excluded.stress, \
                 steps = excluded.steps",
                params![
                    s.user_id,
                    s.date.to_string(),
                    s.resting_hr,
                    s.hrv_ms,
                    s.sleep_hours,
                    s.sleep_score,
                    s.body_battery,
                    s.stress,
                    s.steps
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn workouts_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Workout>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {WORKOUT_COLUMNS} FROM workouts \
                 WHERE user_id = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date ASC, created_at ASC"
            );
            query_workouts(conn, &sql, params![user_id, from.to_string(), to.to_string()])
        })
        .await
    }

    async fn workout(&self, user_id: &str, id: &str) -> Result<Option<Workout>> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        self.with_conn(move |conn| fetch_workout(conn, &user_id, &id))
            .await
    }

    async fn workout_by_external_id(
        &self,
        user_id: &str,
        external_id: &str,
    ) -> Result<Option<Workout>> {
        let (user_id, external_id) = (user_id.to_string(), external_id.to_string());
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {WORKOUT_COLUMNS} FROM workouts \
                 WHERE user_id = ?1 AND external_id = ?2 ORDER BY created_at ASC LIMIT 1"
            );
            Ok(query_workouts(conn, &sql, params![user_id, external_id])?
                .into_iter()
                .next())
        })
        .await
    }

    async fn insert_workout(&self, workout: NewWorkout) -> Result<Workout> {
        let now = Utc::now();
        let record = Workout {
            id: format!("wo_{}", uuid::Uuid::new_v4()),
            user_id: workout.user_id,
            author: workout.author,
            date: workout.date,
            kind: workout.kind,
            title: workout.title,
            status: workout.status,
            prescribed: workout.prescribed,
            actuals: workout.actuals,
            external_id: workout.external_id,
            created_at: now,
            updated_at: now,
        };
        let prescribed = serde_json::to_string(&record.prescribed)?;
        let actuals = record.actuals.as_ref().map(serde_json::to_string).transpose()?;
        let row = record.clone();

        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO workouts ({WORKOUT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    row.id,
                    row.user_id,
                    row.author,
                    row.date.to_string(),
                    row.kind,
                    row.title,
                    row.status.as_str(),
                    prescribed,
                    actuals,
                    row.external_id,
                    ts(row.created_at),
                    ts(row.updated_at)
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await?;

        Ok(record)
    }

    async fn update_workout(&self, workout: &Workout) -> Result<Workout> {
        let prescribed = serde_json::to_string(&workout.prescribed)?;
        let actuals = workout
            .actuals
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let w = workout.clone();

        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction().map_err(db_err)?;
            if let Some(external_id) = &w.external_id {
                let moved = tx
                    .execute(
                        "UPDATE workouts SET external_id = NULL, updated_at = ?4 \
                         WHERE user_id = ?1 AND external_id = ?2 AND id != ?3",
                        params![w.user_id, external_id, w.id, ts(Utc::now())],
                    )
                    .map_err(db_err)?;
                if moved > 0 {
                    debug!(external_id = %external_id, workout_id = %w.id, "Moved activity link");
                }
            }
            let changed = tx
                .execute(
                    "UPDATE workouts SET date = ?3, kind = ?4, title = ?5, status = ?6, \
                     prescribed = ?7, actuals = ?8, external_id = ?9, updated_at = ?10 \
                     WHERE user_id = ?1 AND id = ?2",
                    params![
                        w.user_id,
                        w.id,
                        w.date.to_string(),
                        w.kind,
                        w.title,
                        w.status.as_str(),
                        prescribed,
                        actuals,
                        w.external_id,
                        ts(Utc::now())
                    ],
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Err(CoachError::not_found("workout", w.id));
            }
            let stored = fetch_workout(&tx, &w.user_id, &w.id)?
                .ok_or_else(|| CoachError::not_found("workout", w.id.clone()))?;
            tx.commit().map_err(db_err)?;
            Ok(stored)
        })
        .await
    }

    async fn active_plan(&self, user_id: &str) -> Result<Option<TrainingPlan>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, goal, start_date, end_date, phases FROM training_plans \
                     WHERE user_id = ?1 AND active = 1 ORDER BY start_date DESC LIMIT 1",
                    params![user_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )
                .optional()
                .map_err(db_err)?;

            row.map(|(id, name, goal, start, end, phases)| {
                Ok(TrainingPlan {
                    id,
                    user_id: user_id.clone(),
                    name,
                    goal,
                    start_date: parse_date(&start)?,
                    end_date: parse_date(&end)?,
                    phases: serde_json::from_str(&phases)?,
                    active: true,
                })
            })
            .transpose()
        })
        .await
    }

    async fn insert_plan(&self, plan: &TrainingPlan) -> Result<()> {
        let phases = serde_json::to_string(&plan.phases)?;
        let p = plan.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO training_plans \
                 (id, user_id, name, goal, start_date, end_date, phases, active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    p.id,
                    p.user_id,
                    p.name,
                    p.goal,
                    p.start_date.to_string(),
                    p.end_date.to_string(),
                    phases,
                    p.active
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn active_injuries(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Injury>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let day = date.to_string();
            let mut stmt = conn
                .prepare(
                    "SELECT id, area, severity, notes, started_on, resolved_on FROM injuries \
                     WHERE user_id = ?1 AND started_on <= ?2 \
                     AND (resolved_on IS NULL OR resolved_on > ?2) \
                     ORDER BY severity DESC",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![user_id, day], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u8>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;

            rows.into_iter()
                .map(|(id, area, severity, notes, started, resolved)| {
                    Ok(Injury {
                        id,
                        user_id: user_id.clone(),
                        area,
                        severity,
                        notes,
                        started_on: parse_date(&started)?,
                        resolved_on: parse_opt_date(resolved)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn insert_injury(&self, injury: &Injury) -> Result<()> {
        let i = injury.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO injuries \
                 (id, user_id, area, severity, notes, started_on, resolved_on) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    i.id,
                    i.user_id,
                    i.area,
                    i.severity,
                    i.notes,
                    i.started_on.to_string(),
                    i.resolved_on.map(|d| d.to_string())
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn insert_entry(&self, entry: NewEntry) -> Result<WhiteboardEntry> {
        let record = WhiteboardEntry {
            id: format!("wb_{}", uuid::Uuid::new_v4()),
            user_id: entry.user_id,
            author: entry.author,
            entry_type: entry.entry_type,
            content: entry.content,
            payload: entry.payload,
            priority: entry.priority,
            visibility: entry.visibility,
            requires_response: entry.requires_response,
            tags: entry.tags,
            expires_at: entry.expires_at,
            context_date: entry.context_date,
            created_at: Utc::now(),
        };
        let payload = (!record.payload.is_null())
            .then(|| serde_json::to_string(&record.payload))
            .transpose()?;
        let tags = serde_json::to_string(&record.tags)?;
        let e = record.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO whiteboard_entries (id, user_id, author, entry_type, content, \
                 payload, priority, visibility, requires_response, tags, expires_at, \
                 context_date, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    e.id,
                    e.user_id,
                    e.author,
                    e.entry_type.as_str(),
                    e.content,
                    payload,
                    e.priority,
                    e.visibility.as_str(),
                    e.requires_response,
                    tags,
                    e.expires_at.map(ts),
                    e.context_date.map(|d| d.to_string()),
                    ts(e.created_at)
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await?;

        Ok(record)
    }

    async fn query_entries(
        &self,
        user_id: &str,
        filter: &EntryFilter,
    ) -> Result<Vec<WhiteboardEntry>> {
        let user_id = user_id.to_string();
        let filter = filter.clone();
        self.with_conn(move |conn| {
            // Time bounds go to SQL; the remaining criteria are applied by
            // `EntryFilter::matches` before the limit.
            let since = filter.since.map(ts);
            let active_at = filter.active_at.map(ts);
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, author, entry_type, content, payload, priority, \
                     visibility, requires_response, tags, expires_at, context_date, created_at \
                     FROM whiteboard_entries \
                     WHERE user_id = ?1 \
                     AND (?2 IS NULL OR created_at >= ?2) \
                     AND (?3 IS NULL OR expires_at IS NULL OR expires_at > ?3) \
                     ORDER BY created_at DESC",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![user_id, since, active_at], EntryRow::from_row)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;

            let mut entries = Vec::new();
            for row in rows {
                let entry = row.into_entry()?;
                if filter.matches(&entry) {
                    entries.push(entry);
                    if filter.limit.is_some_and(|limit| entries.len() >= limit) {
                        break;
                    }
                }
            }
            Ok(entries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stride_common::{Actuals, PlanPhase, Prescription};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn workout_roundtrip_and_update() {
        let store = SqliteStore::in_memory().unwrap();
        let planned = NewWorkout::planned("u1", date(2026, 3, 2), "running", "Tempo 8k")
            .with_prescription(Prescription {
                distance_km: Some(8.0),
                pace: Some("4:50/km".into()),
                description: None,
            });
        let mut stored = store.insert_workout(planned).await.unwrap();
        assert_eq!(stored.status, WorkoutStatus::Planned);

        stored.status = WorkoutStatus::Completed;
        stored.external_id = Some("garmin:123".into());
        stored.actuals = Some(Actuals {
            duration_s: 2350.0,
            distance_km: 8.1,
            avg_hr: Some(161),
            max_hr: Some(175),
            splits: vec![],
        });
        let updated = store.update_workout(&stored).await.unwrap();
        assert_eq!(updated.status, WorkoutStatus::Completed);
        assert_eq!(updated.prescribed.distance_km, Some(8.0));

        let found = store
            .workout_by_external_id("u1", "garmin:123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, stored.id);
        assert!(store.workout_by_external_id("u2", "garmin:123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn external_id_moves_between_workouts() {
        let store = SqliteStore::in_memory().unwrap();
        let mut first = store
            .insert_workout(NewWorkout::planned("u1", date(2026, 3, 2), "running", "Easy"))
            .await
            .unwrap();
        let mut second = store
            .insert_workout(NewWorkout::planned("u1", date(2026, 3, 3), "running", "Tempo"))
            .await
            .unwrap();
        let other_user = store
            .insert_workout(NewWorkout::planned("u2", date(2026, 3, 2), "running", "Easy"))
            .await
            .unwrap();

        first.external_id = Some("garmin:7".into());
        store.update_workout(&first).await.unwrap();
        let mut theirs = other_user.clone();
        theirs.external_id = Some("garmin:7".into());
        store.update_workout(&theirs).await.unwrap();

        second.external_id = Some("garmin:7".into());
        store.update_workout(&second).await.unwrap();

        let first = store.workout("u1", &first.id).await.unwrap().unwrap();
        assert_eq!(first.external_id, None);
        let linked = store.workout_by_external_id("u1", "garmin:7").await.unwrap().unwrap();
        assert_eq!(linked.id, second.id);
        // Other users' links are untouched.
        let theirs = store.workout("u2", &other_user.id).await.unwrap().unwrap();
        assert_eq!(theirs.external_id.as_deref(), Some("garmin:7"));
    }

    #[tokio::test]
    async fn failed_update_keeps_existing_link() {
        let store = SqliteStore::in_memory().unwrap();
        let mut linked = store
            .insert_workout(NewWorkout::planned("u1", date(2026, 3, 2), "running", "Easy"))
            .await
            .unwrap();
        linked.external_id = Some("garmin:8".into());
        store.update_workout(&linked).await.unwrap();

        let mut ghost = linked.clone();
        ghost.id = "missing".into();
        assert!(store.update_workout(&ghost).await.is_err());

        let still = store.workout_by_external_id("u1", "garmin:8").await.unwrap().unwrap();
        assert_eq!(still.id, linked.id);
    }

    #[tokio::test]
    async fn update_of_missing_workout_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let mut w = store
            .insert_workout(NewWorkout::planned("u1", date(2026, 3, 2), "running", "Easy"))
            .await
            .unwrap();
        w.user_id = "someone-else".into();
        let err = store.update_workout(&w).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn health_upsert_replaces_same_day() {
        let store = SqliteStore::in_memory().unwrap();
        let mut sample = HealthSample {
            user_id: "u1".into(),
            date: date(2026, 3, 1),
            resting_hr: Some(48),
            ..Default::default()
        };
        store.upsert_health(&sample).await.unwrap();
        sample.resting_hr = Some(52);
        sample.sleep_hours = Some(7.5);
        store.upsert_health(&sample).await.unwrap();

        let rows = store.health_since("u1", date(2026, 2, 20)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resting_hr, Some(52));
        assert_eq!(rows[0].date, date(2026, 3, 1));
    }

    #[tokio::test]
    async fn plan_and_injuries() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.active_plan("u1").await.unwrap().is_none());

        store
            .insert_plan(&TrainingPlan {
                id: "p1".into(),
                user_id: "u1".into(),
                name: "10k".into(),
                goal: None,
                start_date: date(2026, 1, 1),
                end_date: date(2026, 3, 1),
                phases: vec![PlanPhase {
                    name: "base".into(),
                    weeks: 8,
                }],
                active: true,
            })
            .await
            .unwrap();
        let plan = store.active_plan("u1").await.unwrap().unwrap();
        assert_eq!(plan.phases.len(), 1);

        store
            .insert_injury(&Injury {
                id: "i1".into(),
                user_id: "u1".into(),
                area: "calf".into(),
                severity: 2,
                notes: None,
                started_on: date(2026, 2, 1),
                resolved_on: Some(date(2026, 2, 14)),
            })
            .await
            .unwrap();
        assert_eq!(store.active_injuries("u1", date(2026, 2, 10)).await.unwrap().len(), 1);
        assert!(store.active_injuries("u1", date(2026, 2, 14)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_filter_and_expire_at_read_time() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .insert_entry(
                NewEntry::new("u1", "wellness", EntryType::Alert, "HRV dropped")
                    .expires_at(now - Duration::hours(1)),
            )
            .await
            .unwrap();
        store
            .insert_entry(NewEntry::new("u1", "analyst", EntryType::Insight, "Even splits"))
            .await
            .unwrap();

        let active = EntryFilter {
            active_at: Some(now),
            ..Default::default()
        };
        let visible = store.query_entries("u1", &active).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].author, "analyst");

        let all = store.query_entries("u1", &EntryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let by_author = EntryFilter::default().by_author("wellness");
        assert_eq!(store.query_entries("u1", &by_author).await.unwrap().len(), 1);
        assert!(store.query_entries("u2", &EntryFilter::default()).await.unwrap().is_empty());
    }
}
