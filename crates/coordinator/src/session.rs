//! Resumable chat sessions, cached per user and agent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct CachedSession {
    session_id: String,
    stored_at: Instant,
}

#[derive(Default)]
struct Sessions {
    live: HashMap<(String, String), CachedSession>,
    /// Ids dropped from `live` whose conversations have not been ended yet.
    dropped: Vec<String>,
}

impl Sessions {
    fn drop_id(&mut self, session_id: String) {
        if !self.dropped.contains(&session_id) {
            self.dropped.push(session_id);
        }
    }
}

/// Conversation session ids keyed by `(user, agent)`, each valid for a TTL.
///
/// Ids that expire, are replaced or are invalidated are collected and handed
/// out by [`drain_dropped`](Self::drain_dropped) so the owner can end the
/// underlying conversations.
pub struct SessionCache {
    ttl: Duration,
    sessions: Mutex<Sessions>,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(Sessions::default()),
        }
    }

    pub fn get(&self, user_id: &str, agent_id: &str) -> Option<String> {
        let key = (user_id.to_string(), agent_id.to_string());
        let mut sessions = self.sessions.lock();
        match sessions.live.get(&key) {
            Some(s) if s.stored_at.elapsed() < self.ttl => Some(s.session_id.clone()),
            Some(_) => {
                if let Some(expired) = sessions.live.remove(&key) {
                    sessions.drop_id(expired.session_id);
                }
                None
            }
            None => None,
        }
    }

    /// Store or refresh the session for `(user, agent)`.
    pub fn put(&self, user_id: &str, agent_id: &str, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let mut sessions = self.sessions.lock();
        let previous = sessions.live.insert(
            (user_id.to_string(), agent_id.to_string()),
            CachedSession {
                session_id: session_id.clone(),
                stored_at: Instant::now(),
            },
        );
        if let Some(previous) = previous.filter(|p| p.session_id != session_id) {
            sessions.drop_id(previous.session_id);
        }
    }

    pub fn invalidate(&self, user_id: &str, agent_id: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(removed) = sessions
            .live
            .remove(&(user_id.to_string(), agent_id.to_string()))
        {
            sessions.drop_id(removed.session_id);
        }
    }

    /// Take every dropped id, expiring stale entries first.
    pub fn drain_dropped(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock();
        let ttl = self.ttl;
        let expired: Vec<(String, String)> = sessions
            .live
            .iter()
            .filter(|(_, s)| s.stored_at.elapsed() >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(s) = sessions.live.remove(&key) {
                sessions.drop_id(s.session_id);
            }
        }
        std::mem::take(&mut sessions.dropped)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
