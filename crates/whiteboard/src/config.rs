//! Whiteboard configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhiteboardConfig {
    /// Upper bound on entry content length, in characters.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Expiry applied to entries posted without one. `None` keeps them forever.
    #[serde(default)]
    pub default_ttl_hours: Option<u64>,

    /// How far back the best-effort recent read looks.
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,

    /// Maximum entries returned by the recent read.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Token budget for the prompt digest.
    #[serde(default = "default_digest_tokens")]
    pub digest_tokens: usize,
}

fn default_max_content_chars() -> usize {
    4000
}

fn default_recent_days() -> i64 {
    7
}

fn default_recent_limit() -> usize {
    30
}

fn default_digest_tokens() -> usize {
    600
}

impl Default for WhiteboardConfig {
    fn default() -> Self {
        Self {
            max_content_chars: default_max_content_chars(),
            default_ttl_hours: None,
            recent_days: default_recent_days(),
            recent_limit: default_recent_limit(),
            digest_tokens: default_digest_tokens(),
        }
    }
}
