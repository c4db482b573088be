//! Whiteboard behaviour against a real SQLite store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use stride_common::{
    CoachError, EntryFilter, EntryType, HealthSample, Injury, Logger, NewEntry, NewWorkout,
    Result, Store, TrainingPlan, Visibility, WhiteboardEntry, Workout,
};
use stride_store::SqliteStore;
use stride_whiteboard::{Whiteboard, WhiteboardConfig};
use tempfile::TempDir;

fn board(store: Arc<dyn Store>) -> Whiteboard {
    Whiteboard::new(store, WhiteboardConfig::default(), Logger::disabled())
}

#[tokio::test]
async fn expired_entries_are_hidden_but_still_stored() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let wb = board(store.clone());

    wb.post(
        NewEntry::new("u1", "wellness", EntryType::Alert, "Poor sleep three nights running")
            .expires_at(Utc::now() - Duration::minutes(5)),
    )
    .await
    .unwrap();
    wb.post(
        NewEntry::new("u1", "wellness", EntryType::Suggestion, "Swap intervals for easy")
            .expires_at(Utc::now() + Duration::hours(12)),
    )
    .await
    .unwrap();

    let visible = wb.query("u1", EntryFilter::default()).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].entry_type, EntryType::Suggestion);

    let everything = wb
        .query_including_expired("u1", EntryFilter::default())
        .await
        .unwrap();
    assert_eq!(everything.len(), 2);

    // The store itself still holds the expired row.
    let raw = store.query_entries("u1", &EntryFilter::default()).await.unwrap();
    assert_eq!(raw.len(), 2);
}

#[tokio::test]
async fn post_validates_input() {
    let wb = board(Arc::new(SqliteStore::in_memory().unwrap()));

    let err = wb
        .post(NewEntry::new("u1", "coach", EntryType::Observation, "   "))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let err = wb
        .post(NewEntry::new("u1", "coach", EntryType::Observation, "ok").with_priority(101))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("priority"));

    let err = wb
        .post(NewEntry::new("u1", "", EntryType::Observation, "ok"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("author"));

    let long = "a".repeat(WhiteboardConfig::default().max_content_chars + 1);
    assert!(wb
        .post(NewEntry::new("u1", "coach", EntryType::Observation, long))
        .await
        .is_err());
}

#[tokio::test]
async fn default_ttl_applies_only_when_no_expiry_given() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config = WhiteboardConfig {
        default_ttl_hours: Some(24),
        ..Default::default()
    };
    let wb = Whiteboard::new(store, config, Logger::disabled());

    let defaulted = wb
        .post(NewEntry::new("u1", "coach", EntryType::Plan, "Rest day tomorrow"))
        .await
        .unwrap();
    let expiry = defaulted.expires_at.unwrap();
    assert!(expiry > Utc::now() + Duration::hours(23));

    let explicit_at = Utc::now() + Duration::hours(2);
    let explicit = wb
        .post(NewEntry::new("u1", "coach", EntryType::Plan, "Check in later").expires_at(explicit_at))
        .await
        .unwrap();
    assert_eq!(explicit.expires_at, Some(explicit_at));
}

#[tokio::test]
async fn readers_self_select_by_author_type_and_tag() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("wb.db")).unwrap());
    let wb = board(store);

    wb.post(
        NewEntry::new("u1", "analyst", EntryType::Insight, "Negative split on the long run")
            .with_tags(vec!["long_run".into()]),
    )
    .await
    .unwrap();
    wb.post(
        NewEntry::new("u1", "wellness", EntryType::Alert, "Resting HR up 8 bpm")
            .with_visibility(Visibility::User)
            .with_priority(90)
            .requiring_response(),
    )
    .await
    .unwrap();

    let insights = wb
        .query("u1", EntryFilter::default().of_type(EntryType::Insight))
        .await
        .unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].author, "analyst");

    let tagged = wb
        .query("u1", EntryFilter::default().tagged("long_run"))
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);

    // Visibility is stored and filterable but not enforced on plain reads.
    let all = wb.query("u1", EntryFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|e| e.requires_response));

    let digest = wb.digest("u1").await;
    assert!(digest.find("Resting HR").unwrap() < digest.find("Negative split").unwrap());
}

#[tokio::test]
async fn query_is_newest_first_and_digest_is_priority_first() {
    let wb = board(Arc::new(SqliteStore::in_memory().unwrap()));

    for (content, priority) in [("Oldest urgent", 90), ("Middle routine", 30), ("Newest routine", 30)] {
        wb.post(NewEntry::new("u1", "coach", EntryType::Observation, content).with_priority(priority))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let entries = wb.query("u1", EntryFilter::default()).await.unwrap();
    let order: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(order, vec!["Newest routine", "Middle routine", "Oldest urgent"]);

    // A limit keeps the latest entries regardless of priority.
    let latest = wb.query("u1", EntryFilter::default().limit(2)).await.unwrap();
    assert!(latest.iter().all(|e| e.priority == 30));

    let digest = wb.digest("u1").await;
    let urgent = digest.find("Oldest urgent").unwrap();
    let newest = digest.find("Newest routine").unwrap();
    let middle = digest.find("Middle routine").unwrap();
    assert!(urgent < newest && newest < middle);
}

/// A store whose every call fails.
struct BrokenStore;

fn broken<T>() -> Result<T> {
    Err(CoachError::Store("database is locked".into()))
}

#[async_trait]
impl Store for BrokenStore {
    async fn health_since(&self, _: &str, _: NaiveDate) -> Result<Vec<HealthSample>> {
        broken()
    }
    async fn upsert_health(&self, _: &HealthSample) -> Result<()> {
        broken()
    }
    async fn workouts_between(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<Workout>> {
        broken()
    }
    async fn workout(&self, _: &str, _: &str) -> Result<Option<Workout>> {
        broken()
    }
    async fn workout_by_external_id(&self, _: &str, _: &str) -> Result<Option<Workout>> {
        broken()
    }
    async fn insert_workout(&self, _: NewWorkout) -> Result<Workout> {
        broken()
    }
    async fn update_workout(&self, _: &Workout) -> Result<Workout> {
        broken()
    }
    async fn active_plan(&self, _: &str) -> Result<Option<TrainingPlan>> {
        broken()
    }
    async fn insert_plan(&self, _: &TrainingPlan) -> Result<()> {
        broken()
    }
    async fn active_injuries(&self, _: &str, _: NaiveDate) -> Result<Vec<Injury>> {
        broken()
    }
    async fn insert_injury(&self, _: &Injury) -> Result<()> {
        broken()
    }
    async fn insert_entry(&self, _: NewEntry) -> Result<WhiteboardEntry> {
        broken()
    }
    async fn query_entries(&self, _: &str, _: &EntryFilter) -> Result<Vec<WhiteboardEntry>> {
        broken()
    }
}

#[tokio::test]
async fn recent_read_degrades_to_empty_but_query_propagates() {
    let wb = board(Arc::new(BrokenStore));
    assert!(wb.recent("u1").await.is_empty());
    assert_eq!(wb.digest("u1").await, "");

    let err = wb.query("u1", EntryFilter::default()).await.unwrap_err();
    assert_eq!(err.code(), "STORE_ERROR");

    let err = wb
        .post(NewEntry::new("u1", "coach", EntryType::Observation, "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STORE_ERROR");
}
