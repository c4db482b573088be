use chrono::NaiveDate;
use stride_common::{EntryFilter, EntryType, NewEntry, NewWorkout, Store};
use stride_store::SqliteStore;

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stride.db");
    let day = NaiveDate::from_ymd_opt(2026, 4, 12).unwrap();

    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .insert_workout(NewWorkout::planned("u1", day, "running", "Long run"))
            .await
            .unwrap();
        store
            .insert_entry(
                NewEntry::new("u1", "planner", EntryType::Plan, "Long run moved to Sunday")
                    .with_tags(vec!["schedule".into()])
                    .for_date(day),
            )
            .await
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let workouts = store.workouts_on("u1", day).await.unwrap();
    assert_eq!(workouts.len(), 1);
    assert_eq!(workouts[0].title, "Long run");

    let entries = store
        .query_entries("u1", &EntryFilter::default().tagged("schedule"))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].context_date, Some(day));
}

#[tokio::test]
async fn workouts_between_is_inclusive_and_ordered() {
    let store = SqliteStore::in_memory().unwrap();
    for (d, title) in [(14, "C"), (10, "A"), (12, "B"), (20, "outside")] {
        let date = NaiveDate::from_ymd_opt(2026, 4, d).unwrap();
        store
            .insert_workout(NewWorkout::planned("u1", date, "running", title))
            .await
            .unwrap();
    }

    let from = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
    let to = NaiveDate::from_ymd_opt(2026, 4, 14).unwrap();
    let titles: Vec<_> = store
        .workouts_between("u1", from, to)
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.title)
        .collect();
    assert_eq!(titles, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn entry_limit_applies_after_filtering() {
    let store = SqliteStore::in_memory().unwrap();
    for i in 0..5 {
        let author = if i % 2 == 0 { "coach" } else { "analyst" };
        store
            .insert_entry(NewEntry::new("u1", author, EntryType::Observation, format!("note {i}")))
            .await
            .unwrap();
    }

    let filter = EntryFilter::default().by_author("coach").limit(2);
    let entries = store.query_entries("u1", &filter).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.author == "coach"));
}
