//! Durable session store on redb.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::session::{SessionState, SessionStore};

const SESSION_TABLE: TableDefinition<&str, &str> = TableDefinition::new("sessions");

#[derive(Serialize, Deserialize)]
struct StoredSession {
    /// Unix seconds
    expires_at: i64,
    state: SessionState,
}

pub struct RedbSessionStore {
    db: Database,
}

impl RedbSessionStore {
    /// Open or create redb database
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .with_context(|| format!("Failed to open session database {}", path.display()))?;

        // Create table if not exists
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSION_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            table.remove(session_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedbSessionStore {
    async fn get(&self, session_id: &str) -> Result<SessionState> {
        let stored = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SESSION_TABLE)?;
            match table.get(session_id)? {
                Some(value) => Some(
                    serde_json::from_str::<StoredSession>(value.value())
                        .context("Corrupt session record")?,
                ),
                None => None,
            }
        };

        match stored {
            Some(stored) if stored.expires_at > Utc::now().timestamp() => Ok(stored.state),
            Some(_) => {
                tracing::debug!(session_id, "Session expired");
                self.remove(session_id)?;
                Ok(SessionState::new(session_id))
            }
            None => Ok(SessionState::new(session_id)),
        }
    }

    async fn set(&self, state: &SessionState, ttl: Duration) -> Result<()> {
        let expires_at = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| Utc::now().timestamp().checked_add(secs))
            .unwrap_or(i64::MAX);
        let record = StoredSession {
            expires_at,
            state: state.clone(),
        };
        let value = serde_json::to_string(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            table.insert(state.session_id.as_str(), value.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::DynamicRule;
    use tempfile::TempDir;

    fn state() -> SessionState {
        let mut state = SessionState::new("s1");
        state.dynamic_rules.push(DynamicRule {
            rule_id: "fin_disclaimer".into(),
            domain: "financial".into(),
            kind: Default::default(),
            description: "Not investment advice".into(),
            severity: Default::default(),
            condition: String::new(),
            action: String::new(),
        });
        state.record_exchange("should I buy", "I can't say");
        state
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.redb");
        {
            let store = RedbSessionStore::open(&path).unwrap();
            store.set(&state(), Duration::from_secs(3600)).await.unwrap();
        }
        let store = RedbSessionStore::open(&path).unwrap();
        assert_eq!(store.get("s1").await.unwrap(), state());
    }

    #[tokio::test]
    async fn test_expired_and_deleted() {
        let dir = TempDir::new().unwrap();
        let store = RedbSessionStore::open(&dir.path().join("s.redb")).unwrap();

        store.set(&state(), Duration::ZERO).await.unwrap();
        assert!(store.get("s1").await.unwrap().dynamic_rules.is_empty());

        store.set(&state(), Duration::from_secs(60)).await.unwrap();
        store.delete("s1").await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), SessionState::new("s1"));
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates() {
        let dir = TempDir::new().unwrap();
        let store = RedbSessionStore::open(&dir.path().join("s.redb")).unwrap();

        store.set(&state(), Duration::from_secs(u64::MAX)).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), state());
    }
}
