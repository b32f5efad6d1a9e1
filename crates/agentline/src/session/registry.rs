//! Concurrent session table with per-session exclusion.
//!
//! Each session id maps to its own async mutex, so acquiring one session never
//! waits on another. Holding a `SessionGuard` is what makes a run the single
//! writer of that session's history.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::{Session, SessionSnapshot};
use crate::config::BusyPolicy;

/// Default interval between idle-eviction sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Another run holds the session.
    #[error("session busy: {0}")]
    Busy(String),
}

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    last_access: Instant,
}

/// Registry of live sessions.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionEntry>>,
    policy: BusyPolicy,
    acquire_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(policy: BusyPolicy, acquire_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            policy,
            acquire_timeout,
        }
    }

    pub fn policy(&self) -> BusyPolicy {
        self.policy
    }

    /// Take exclusive ownership of a session, creating it if unseen.
    ///
    /// Under `BusyPolicy::Reject` a held session fails immediately with
    /// `Busy`. Under `BusyPolicy::Wait` callers queue on the session's
    /// mutex (FIFO) and get `Busy` only after the acquire timeout.
    pub async fn acquire(&self, id: &str) -> Result<SessionGuard, SessionError> {
        let session = self.get_or_create(id);

        let guard = match self.policy {
            BusyPolicy::Reject => session
                .try_lock_owned()
                .map_err(|_| SessionError::Busy(id.to_string()))?,
            BusyPolicy::Wait => tokio::time::timeout(self.acquire_timeout, session.lock_owned())
                .await
                .map_err(|_| SessionError::Busy(id.to_string()))?,
        };

        debug!(session_id = %id, "Session acquired");
        Ok(SessionGuard {
            guard,
            sessions: self.sessions.clone(),
        })
    }

    /// Release a session. Equivalent to dropping the guard.
    pub fn release(&self, guard: SessionGuard) {
        drop(guard);
    }

    /// Copy of a session's history.
    ///
    /// `Ok(None)` if the id is unknown, `Busy` while a run holds the session.
    pub fn history(&self, id: &str) -> Result<Option<SessionSnapshot>, SessionError> {
        let Some(session) = self.sessions.get(id).map(|e| e.session.clone()) else {
            return Ok(None);
        };
        let session = session
            .try_lock()
            .map_err(|_| SessionError::Busy(id.to_string()))?;
        Ok(Some(session.snapshot()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions idle for longer than `max_age` that nobody holds or awaits.
    ///
    /// Returns the number of sessions removed.
    pub fn evict_idle(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        // strong_count == 1 means only the table holds the session
        self.sessions.retain(|_, entry| {
            Arc::strong_count(&entry.session) > 1
                || now.duration_since(entry.last_access) < max_age
        });
        before.saturating_sub(self.sessions.len())
    }

    /// Spawn a task that evicts idle sessions until `shutdown` is cancelled.
    pub fn spawn_cleanup_task(
        self,
        interval: Duration,
        max_age: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.evict_idle(max_age);
                        if removed > 0 {
                            info!(removed, remaining = self.len(), "Evicted idle sessions");
                        }
                    }
                }
            }
        })
    }

    fn get_or_create(&self, id: &str) -> Arc<Mutex<Session>> {
        let now = Instant::now();
        self.sessions
            .entry(id.to_string())
            .and_modify(|entry| entry.last_access = now)
            .or_insert_with(|| {
                info!(session_id = %id, "Session created");
                SessionEntry {
                    session: Arc::new(Mutex::new(Session::new(id))),
                    last_access: now,
                }
            })
            .session
            .clone()
    }
}

// ============================================================================
// SessionGuard
// ============================================================================

/// Exclusive handle to one session. Dropping it releases the session.
pub struct SessionGuard {
    guard: OwnedMutexGuard<Session>,
    sessions: Arc<DashMap<String, SessionEntry>>,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        self.guard.id()
    }
}

impl std::ops::Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.guard
    }
}

impl std::ops::DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.guard
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Idle time counts from release, not from acquire
        if let Some(mut entry) = self.sessions.get_mut(self.guard.id()) {
            entry.last_access = Instant::now();
        }
        debug!(session_id = %self.guard.id(), "Session released");
    }
}
