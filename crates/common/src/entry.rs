//! Whiteboard entry types.
//!
//! Entries are written once by their author and never updated. Readers
//! select what they care about with an [`EntryFilter`]; nothing is addressed
//! to a recipient.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Kind of note an entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Observation,
    Suggestion,
    Alert,
    Insight,
    Plan,
    Reflection,
    Summary,
    Question,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Suggestion => "suggestion",
            Self::Alert => "alert",
            Self::Insight => "insight",
            Self::Plan => "plan",
            Self::Reflection => "reflection",
            Self::Summary => "summary",
            Self::Question => "question",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "observation" => Some(Self::Observation),
            "suggestion" => Some(Self::Suggestion),
            "alert" => Some(Self::Alert),
            "insight" => Some(Self::Insight),
            "plan" => Some(Self::Plan),
            "reflection" => Some(Self::Reflection),
            "summary" => Some(Self::Summary),
            "question" => Some(Self::Question),
            _ => None,
        }
    }
}

/// Who an entry is meant to be shown to. Stored and filterable, not enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Other agents only.
    Agents,
    /// Surfaced to the user.
    User,
    #[default]
    All,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agents => "agents",
            Self::User => "user",
            Self::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agents" => Some(Self::Agents),
            "user" => Some(Self::User),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

pub const MAX_PRIORITY: u8 = 100;

fn default_priority() -> u8 {
    50
}

/// A persisted whiteboard entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhiteboardEntry {
    pub id: String,
    pub user_id: String,
    pub author: String,
    pub entry_type: EntryType,
    pub content: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// Display ordering only, 0..=100.
    pub priority: u8,
    pub visibility: Visibility,
    /// Advisory; nothing tracks whether a response arrives.
    pub requires_response: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl WhiteboardEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Fields an author supplies when posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub user_id: String,
    pub author: String,
    pub entry_type: EntryType,
    pub content: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub requires_response: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context_date: Option<NaiveDate>,
}

impl NewEntry {
    pub fn new(
        user_id: impl Into<String>,
        author: impl Into<String>,
        entry_type: EntryType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            author: author.into(),
            entry_type,
            content: content.into(),
            payload: serde_json::Value::Null,
            priority: default_priority(),
            visibility: Visibility::default(),
            requires_response: false,
            tags: vec![],
            expires_at: None,
            context_date: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn for_date(mut self, date: NaiveDate) -> Self {
        self.context_date = Some(date);
        self
    }

    pub fn requiring_response(mut self) -> Self {
        self.requires_response = true;
        self
    }
}

/// Query over one user's entries. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFilter {
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub types: Vec<EntryType>,
    /// Matches entries carrying any of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context_date: Option<NaiveDate>,
    #[serde(default)]
    pub min_priority: Option<u8>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    /// Exclude entries whose expiry is at or before this instant.
    #[serde(default)]
    pub active_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EntryFilter {
    pub fn by_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn of_type(mut self, entry_type: EntryType) -> Self {
        self.types.push(entry_type);
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `entry` passes every criterion. Stores that cannot push a
    /// criterion down into their query use this to post-filter.
    pub fn matches(&self, entry: &WhiteboardEntry) -> bool {
        (self.authors.is_empty() || self.authors.contains(&entry.author))
            && (self.types.is_empty() || self.types.contains(&entry.entry_type))
            && (self.tags.is_empty() || entry.tags.iter().any(|t| self.tags.contains(t)))
            && self.since.is_none_or(|s| entry.created_at >= s)
            && self
                .context_date
                .is_none_or(|d| entry.context_date == Some(d))
            && self.min_priority.is_none_or(|p| entry.priority >= p)
            && self.visibility.is_none_or(|v| entry.visibility == v)
            && self.active_at.is_none_or(|now| !entry.is_expired_at(now))
    }
}
