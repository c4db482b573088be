//! Whiteboard service over the shared store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use stride_common::entry::MAX_PRIORITY;
use stride_common::{
    CoachError, EntryFilter, Logger, NewEntry, Result, Store, WhiteboardEntry,
};
use tracing::{Instrument, debug, info, warn};

use crate::config::WhiteboardConfig;
use crate::digest::render_digest;

/// Validated posting and expiry-aware reading of whiteboard entries.
///
/// Visibility is stored with each entry and can be filtered on, but reads do
/// not restrict by it; callers decide what to show to whom.
#[derive(Clone)]
pub struct Whiteboard {
    store: Arc<dyn Store>,
    config: WhiteboardConfig,
    log: Logger,
}

impl Whiteboard {
    pub fn new(store: Arc<dyn Store>, config: WhiteboardConfig, log: Logger) -> Self {
        Self { store, config, log }
    }

    pub fn config(&self) -> &WhiteboardConfig {
        &self.config
    }

    fn validate(&self, entry: &NewEntry) -> Result<()> {
        if entry.user_id.trim().is_empty() {
            return Err(CoachError::validation("user_id", "must not be empty"));
        }
        if entry.author.trim().is_empty() {
            return Err(CoachError::validation("author", "must not be empty"));
        }
        if entry.content.trim().is_empty() {
            return Err(CoachError::validation("content", "must not be empty"));
        }
        let chars = entry.content.chars().count();
        if chars > self.config.max_content_chars {
            return Err(CoachError::validation(
                "content",
                format!(
                    "{chars} characters exceeds the limit of {}",
                    self.config.max_content_chars
                ),
            ));
        }
        if entry.priority > MAX_PRIORITY {
            return Err(CoachError::validation(
                "priority",
                format!("{} is outside 0..={MAX_PRIORITY}", entry.priority),
            ));
        }
        Ok(())
    }

    /// Persist a new entry. The stored entry is never modified afterwards.
    pub async fn post(&self, mut entry: NewEntry) -> Result<WhiteboardEntry> {
        self.validate(&entry)?;

        if entry.expires_at.is_none() {
            entry.expires_at = self
                .config
                .default_ttl_hours
                .map(|hours| Utc::now() + Duration::hours(hours as i64));
        }

        let span = self.log.span();
        async {
            let stored = self.store.insert_entry(entry).await?;
            info!(
                entry_id = %stored.id,
                author = %stored.author,
                entry_type = stored.entry_type.as_str(),
                priority = stored.priority,
                "Posted whiteboard entry"
            );
            Ok(stored)
        }
        .instrument(span)
        .await
    }

    /// Entries for `user_id` matching `filter`, newest first. Entries whose
    /// expiry has passed are excluded.
    pub async fn query(&self, user_id: &str, filter: EntryFilter) -> Result<Vec<WhiteboardEntry>> {
        let filter = EntryFilter {
            active_at: Some(Utc::now()),
            ..filter
        };
        self.store.query_entries(user_id, &filter).await
    }

    /// Like [`query`](Self::query) but keeps expired entries.
    pub async fn query_including_expired(
        &self,
        user_id: &str,
        filter: EntryFilter,
    ) -> Result<Vec<WhiteboardEntry>> {
        let filter = EntryFilter {
            active_at: None,
            ..filter
        };
        self.store.query_entries(user_id, &filter).await
    }

    /// Recent, unexpired entries. A read failure yields an empty list.
    pub async fn recent(&self, user_id: &str) -> Vec<WhiteboardEntry> {
        let filter = EntryFilter::default()
            .since(Utc::now() - Duration::days(self.config.recent_days))
            .limit(self.config.recent_limit);

        match self.query(user_id, filter).await {
            Ok(entries) => {
                debug!(parent: &self.log.span(), user_id = %user_id, count = entries.len(), "Read recent entries");
                entries
            }
            Err(e) => {
                warn!(parent: &self.log.span(), user_id = %user_id, error = %e, "Whiteboard read failed; continuing without entries");
                Vec::new()
            }
        }
    }

    /// Recent entries rendered for a prompt, within the configured budget.
    pub async fn digest(&self, user_id: &str) -> String {
        let entries = self.recent(user_id).await;
        render_digest(&entries, self.config.digest_tokens)
    }
}
