//! In-memory session store keyed by user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::session::{Session, UserId};

/// Lock-guarded map of active sessions.
///
/// Events for one user are delivered in order by the agent loop, so the
/// map lock only has to keep concurrent access from the pruning task and
/// other users consistent.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a session, replacing any existing one for the same user.
    /// Returns the replaced session.
    pub async fn insert(&self, session: Session) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.user_id, session)
    }

    /// Snapshot of a user's session.
    pub async fn get(&self, user_id: UserId) -> Option<Session> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    /// Run `f` against a user's session under the write lock.
    /// Returns `None` when the user has no session.
    pub async fn with_session<F, R>(&self, user_id: UserId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&user_id).map(f)
    }

    pub async fn remove(&self, user_id: UserId) -> Option<Session> {
        self.sessions.write().await.remove(&user_id)
    }

    pub async fn contains(&self, user_id: UserId) -> bool {
        self.sessions.read().await.contains_key(&user_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Snapshots of every completed session still held.
    pub async fn completed(&self) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_complete())
            .cloned()
            .collect()
    }

    /// Drop sessions idle for longer than `timeout`. Returns how many were dropped.
    pub async fn prune_idle(&self, timeout: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|user_id, session| {
            let idle = session.is_idle(now, timeout);
            if idle && session.is_complete() && !session.delivery.is_done() {
                warn!(
                    user_id = %user_id,
                    session_id = %session.id,
                    delivery = ?session.delivery,
                    "Evicting completed session with undelivered results"
                );
            } else if idle {
                debug!(
                    user_id = %user_id,
                    session_id = %session.id,
                    step = session.step(),
                    "Evicting idle session"
                );
            }
            !idle
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(count = pruned, "Pruned idle sessions");
        }
        pruned
    }
}

/// Spawn a background task that periodically evicts idle sessions.
pub fn spawn_prune_task(
    store: Arc<SessionStore>,
    interval: Duration,
    idle_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip immediate first tick
        loop {
            ticker.tick().await;
            store.prune_idle(idle_timeout).await;
        }
    })
}
