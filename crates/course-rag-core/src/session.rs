//! Conversation sessions.
//!
//! A session is an opaque id plus a bounded, oldest-first history of
//! [`Exchange`]s. The [`SessionManager`] trait is what the orchestrator
//! depends on; [`InMemorySessionManager`] is the default backend.
//!
//! Each session's history sits behind its own mutex, so exchanges on the
//! same session are applied one at a time in arrival order, while
//! different sessions only contend on the brief map lookup.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::Exchange;

/// Session storage used by the RAG orchestrator.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Create a new session and return its id.
    async fn create_session(&self) -> Result<String>;

    /// Append an exchange, evicting the oldest when over capacity.
    ///
    /// An unknown `session_id` implicitly creates the session.
    async fn add_exchange(&self, session_id: &str, query: &str, answer: &str) -> Result<()>;

    /// Return the retained exchanges, oldest first. Unknown ids yield an
    /// empty history.
    async fn get_history(&self, session_id: &str) -> Result<Vec<Exchange>>;

    /// Drop a session's history.
    async fn clear_session(&self, session_id: &str) -> Result<()>;
}

type History = Arc<Mutex<VecDeque<Exchange>>>;

/// Process-local session store with FIFO eviction at `max_history`.
pub struct InMemorySessionManager {
    max_history: usize,
    sessions: RwLock<HashMap<String, History>>,
}

impl InMemorySessionManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn lookup(&self, session_id: &str) -> Result<Option<History>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        Ok(sessions.get(session_id).cloned())
    }

    fn lookup_or_create(&self, session_id: &str) -> Result<History> {
        if let Some(history) = self.lookup(session_id)? {
            return Ok(history);
        }
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        Ok(sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone())
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn create_session(&self) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.lookup_or_create(&id)?;
        Ok(id)
    }

    async fn add_exchange(&self, session_id: &str, query: &str, answer: &str) -> Result<()> {
        let history = self.lookup_or_create(session_id)?;
        let mut history = history
            .lock()
            .map_err(|_| anyhow!("session '{}' lock poisoned", session_id))?;
        history.push_back(Exchange::new(query, answer));
        while history.len() > self.max_history {
            history.pop_front();
        }
        Ok(())
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<Exchange>> {
        let Some(history) = self.lookup(session_id)? else {
            return Ok(Vec::new());
        };
        let history = history
            .lock()
            .map_err(|_| anyhow!("session '{}' lock poisoned", session_id))?;
        Ok(history.iter().cloned().collect())
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_session_unique() {
        let m = InMemorySessionManager::new(2);
        let a = m.create_session().await.unwrap();
        let b = m.create_session().await.unwrap();
        assert_ne!(a, b);
        assert!(m.get_history(&a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_implicitly_created() {
        let m = InMemorySessionManager::new(2);
        m.add_exchange("client-chosen", "q", "a").await.unwrap();
        let h = m.get_history("client-chosen").await.unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].query, "q");
        assert_eq!(h[0].answer, "a");
    }

    #[tokio::test]
    async fn test_history_bound_keeps_latest_in_order() {
        let m = InMemorySessionManager::new(2);
        for i in 0..5 {
            m.add_exchange("s", &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }
        let h = m.get_history("s").await.unwrap();
        let queries: Vec<&str> = h.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["q3", "q4"]);
    }

    #[tokio::test]
    async fn test_zero_history_retains_nothing() {
        let m = InMemorySessionManager::new(0);
        m.add_exchange("s", "q", "a").await.unwrap();
        assert!(m.get_history("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_session() {
        let m = InMemorySessionManager::new(2);
        m.add_exchange("s", "q", "a").await.unwrap();
        m.clear_session("s").await.unwrap();
        assert!(m.get_history("s").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_independent() {
        let m = Arc::new(InMemorySessionManager::new(100));
        let mut handles = Vec::new();
        for s in 0..4 {
            let m = m.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    m.add_exchange(&format!("s{}", s), &i.to_string(), "a")
                        .await
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        for s in 0..4 {
            let h = m.get_history(&format!("s{}", s)).await.unwrap();
            let queries: Vec<String> = h.iter().map(|e| e.query.clone()).collect();
            let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
            assert_eq!(queries, expected);
        }
    }
}
