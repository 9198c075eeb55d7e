//! Per-session conversation state and its stores.

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::guardrails::DynamicRule;

/// Conversation history kept per session
pub const MAX_HISTORY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// State carried between turns of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub session_id: String,
    /// Active rules, oldest first
    #[serde(default)]
    pub dynamic_rules: Vec<DynamicRule>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl SessionState {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            ..Default::default()
        }
    }

    /// Append a user/assistant exchange, keeping the last `MAX_HISTORY` entries
    pub fn record_exchange(&mut self, user: &str, assistant: &str) {
        self.history.push(HistoryEntry {
            role: "user".into(),
            content: user.to_string(),
        });
        self.history.push(HistoryEntry {
            role: "assistant".into(),
            content: assistant.to_string(),
        });
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

/// Keyed session persistence with expiry
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stored state, or a fresh state when missing or expired
    async fn get(&self, session_id: &str) -> Result<SessionState>;

    async fn set(&self, state: &SessionState, ttl: Duration) -> Result<()>;

    async fn delete(&self, session_id: &str) -> Result<()>;
}

/// Process-local store; entries expire lazily on read. An entry whose
/// ttl reaches past what `Instant` can represent never expires.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, (Option<Instant>, SessionState)>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<SessionState> {
        let expired = match self.sessions.get(session_id) {
            Some(entry) if entry.0.is_none_or(|at| at > Instant::now()) => {
                return Ok(entry.1.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.sessions.remove(session_id);
            tracing::debug!(session_id, "Session expired");
        }
        Ok(SessionState::new(session_id))
    }

    async fn set(&self, state: &SessionState, ttl: Duration) -> Result<()> {
        self.sessions
            .insert(state.session_id.clone(), (Instant::now().checked_add(ttl), state.clone()));
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_session_is_fresh() {
        let store = MemorySessionStore::new();
        let state = store.get("s1").await.unwrap();
        assert_eq!(state.session_id, "s1");
        assert!(state.dynamic_rules.is_empty());
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemorySessionStore::new();
        let mut state = SessionState::new("s1");
        state.record_exchange("hi", "hello");
        store.set(&state, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), state);

        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let store = MemorySessionStore::new();
        let mut state = SessionState::new("s1");
        state.record_exchange("hi", "hello");
        store.set(&state, Duration::ZERO).await.unwrap();
        assert!(store.get("s1").await.unwrap().history.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let store = MemorySessionStore::new();
        let state = SessionState::new("s1");
        store.set(&state, Duration::MAX).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), state);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = SessionState::new("s");
        for i in 0..15 {
            state.record_exchange(&format!("q{i}"), &format!("a{i}"));
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history.last().unwrap().content, "a14");
        assert_eq!(state.history[0].content, "q5");
    }
}
