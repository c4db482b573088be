//! Whiteboard tools.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stride_common::{
    AgentContext, CoachError, EntryFilter, EntryType, NewEntry, Result, Visibility,
    WhiteboardEntry,
};
use stride_whiteboard::Whiteboard;

use super::{CoachTool, POST_TO_WHITEBOARD, READ_WHITEBOARD, ToolCollector, parse_args, schema_for};

/// Input for post_to_whiteboard.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PostInput {
    /// One of: observation, suggestion, alert, insight, plan, reflection, summary, question
    pub entry_type: String,

    /// The note itself, written for the athlete and the other agents
    pub content: String,

    /// Display priority from 0 to 100 (default 50)
    #[serde(default)]
    pub priority: Option<u8>,

    /// Free-form tags other agents can filter on
    #[serde(default)]
    pub tags: Vec<String>,

    /// Set when the athlete should answer this entry
    #[serde(default)]
    pub requires_response: bool,

    /// Hide the entry after this many hours
    #[serde(default)]
    pub expires_in_hours: Option<u32>,

    /// One of: agents, user, all (default all)
    #[serde(default)]
    pub visibility: Option<String>,
}

/// Input for read_whiteboard.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReadInput {
    /// Only entries by these authors
    #[serde(default)]
    pub authors: Vec<String>,

    /// Only entries of these types
    #[serde(default)]
    pub types: Vec<String>,

    /// Only entries carrying one of these tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Only entries from the last N hours
    #[serde(default)]
    pub since_hours: Option<u32>,

    /// Maximum entries to return (default 20)
    #[serde(default)]
    pub limit: Option<usize>,
}

fn parse_entry_type(field: &str, value: &str) -> Result<EntryType> {
    EntryType::parse(value).ok_or_else(|| {
        CoachError::validation(field, format!("unknown entry type '{value}'"))
    })
}

pub struct PostToWhiteboard {
    whiteboard: Whiteboard,
}

impl PostToWhiteboard {
    pub fn new(whiteboard: Whiteboard) -> Self {
        Self { whiteboard }
    }
}

#[async_trait]
impl CoachTool for PostToWhiteboard {
    fn name(&self) -> &str {
        POST_TO_WHITEBOARD
    }

    fn description(&self) -> &str {
        "Post a note to the shared whiteboard so other agents and the athlete can see it."
    }

    fn input_schema(&self) -> Value {
        schema_for::<PostInput>()
    }

    async fn execute(
        &self,
        args: Value,
        ctx: &AgentContext,
        collector: &ToolCollector,
    ) -> Result<String> {
        let input: PostInput = parse_args(self.name(), args)?;
        let entry_type = parse_entry_type("entry_type", &input.entry_type)?;

        let mut entry = NewEntry::new(&ctx.user_id, collector.agent_id(), entry_type, input.content)
            .with_tags(input.tags)
            .for_date(ctx.date)
            .with_payload(json!({ "task": ctx.task.name() }));
        if let Some(priority) = input.priority {
            entry = entry.with_priority(priority);
        }
        if input.requires_response {
            entry = entry.requiring_response();
        }
        if let Some(hours) = input.expires_in_hours {
            entry = entry.expires_at(Utc::now() + Duration::hours(i64::from(hours)));
        }
        if let Some(visibility) = input.visibility {
            let visibility = Visibility::parse(&visibility).ok_or_else(|| {
                CoachError::validation("visibility", format!("unknown visibility '{visibility}'"))
            })?;
            entry = entry.with_visibility(visibility);
        }

        let stored = self.whiteboard.post(entry).await?;
        let reply = json!({ "id": stored.id, "posted": true }).to_string();
        collector.record_post(stored);
        Ok(reply)
    }
}

pub struct ReadWhiteboard {
    whiteboard: Whiteboard,
}

impl ReadWhiteboard {
    pub fn new(whiteboard: Whiteboard) -> Self {
        Self { whiteboard }
    }
}

#[derive(Serialize)]
struct EntryView<'a> {
    id: &'a str,
    author: &'a str,
    entry_type: &'static str,
    priority: u8,
    content: &'a str,
    tags: &'a [String],
    requires_response: bool,
    created_at: String,
}

impl<'a> From<&'a WhiteboardEntry> for EntryView<'a> {
    fn from(e: &'a WhiteboardEntry) -> Self {
        Self {
            id: &e.id,
            author: &e.author,
            entry_type: e.entry_type.as_str(),
            priority: e.priority,
            content: &e.content,
            tags: &e.tags,
            requires_response: e.requires_response,
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

#[async_trait]
impl CoachTool for ReadWhiteboard {
    fn name(&self) -> &str {
        READ_WHITEBOARD
    }

    fn description(&self) -> &str {
        "Read recent whiteboard entries, optionally filtered by author, type, tag or age."
    }

    fn input_schema(&self) -> Value {
        schema_for::<ReadInput>()
    }

    async fn execute(
        &self,
        args: Value,
        ctx: &AgentContext,
        _collector: &ToolCollector,
    ) -> Result<String> {
        let input: ReadInput = parse_args(self.name(), args)?;

        let mut filter = EntryFilter::default().limit(input.limit.unwrap_or(20));
        for author in input.authors {
            filter = filter.by_author(author);
        }
        for t in &input.types {
            filter = filter.of_type(parse_entry_type("types", t)?);
        }
        for tag in input.tags {
            filter = filter.tagged(tag);
        }
        if let Some(hours) = input.since_hours {
            filter = filter.since(Utc::now() - Duration::hours(i64::from(hours)));
        }

        let entries = self.whiteboard.query(&ctx.user_id, filter).await?;
        let views: Vec<EntryView<'_>> = entries.iter().map(EntryView::from).collect();
        Ok(serde_json::to_string(&views)?)
    }
}
