//! The session registry: id→session lookup and idle reaping.
//!
//! Sessions never talk to each other; this map and its sweep timer are the
//! only cross-session coordination. Reaping is eventual, best-effort cleanup
//! — it stops and removes sessions that have gone idle or whose loop already
//! died — and never a correctness mechanism.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::protocol::Command;
use crate::session::{Session, SessionConfig};

/// Holds live sessions by id.
pub struct Registry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Registry {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a session under `id`. Returns `false` (and spawns nothing) if
    /// the id is taken.
    ///
    /// Must be called within a tokio runtime.
    pub fn create(&self, id: &str, config: SessionConfig) -> bool {
        let mut sessions = self.lock();
        if sessions.contains_key(id) {
            return false;
        }
        sessions.insert(id.to_string(), Session::spawn(id, config));
        info!(session = id, "session created");
        true
    }

    /// Route a command to the session with this id.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownSession`] if no session has the id;
    /// [`SessionError::Stopped`] if its loop has exited.
    pub fn submit(&self, id: &str, cmd: Command) -> Result<()> {
        self.lock()
            .get(id)
            .ok_or(SessionError::UnknownSession)?
            .submit(cmd)
    }

    /// Current freshness version of a session, for stamping commands.
    pub fn version_of(&self, id: &str) -> Option<u64> {
        self.lock().get(id).map(Session::version)
    }

    /// Remove and return a session without stopping it.
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.lock().remove(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// One reaping pass: remove every session that is no longer running or
    /// has been idle at least `max_idle`, and shut each one down in the
    /// background. Returns the reaped ids.
    ///
    /// Must be called within a tokio runtime.
    pub fn reap(&self, max_idle: Duration) -> Vec<String> {
        let mut sessions = self.lock();
        let doomed: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| !s.is_running() || s.idle_for() >= max_idle)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            if let Some(mut session) = sessions.remove(id) {
                info!(session = %id, "reaping idle session");
                tokio::spawn(async move { session.shutdown().await });
            }
        }
        doomed
    }

    /// Spawn a background task that calls [`reap`](Registry::reap) every
    /// `every`. The task runs until aborted or the registry is dropped with
    /// it.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        max_idle: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let reaped = registry.reap(max_idle);
                if !reaped.is_empty() {
                    debug!(count = reaped.len(), "sweep reaped sessions");
                }
            }
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sessions", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::CommandKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let registry = Registry::new();
        assert!(registry.create("a", SessionConfig::new()));
        assert!(!registry.create("a", SessionConfig::new()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn submit_routes_by_id() {
        let registry = Registry::new();
        registry.create("a", SessionConfig::new());
        registry
            .submit("a", Command::new(CommandKind::Join, Uuid::new_v4(), 0))
            .unwrap();
        let err = registry
            .submit("missing", Command::new(CommandKind::Join, Uuid::new_v4(), 0))
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession));
    }

    #[tokio::test]
    async fn reap_removes_idle_sessions() {
        let registry = Registry::new();
        registry.create("a", SessionConfig::new());
        // Zero tolerance: everything is idle.
        let reaped = registry.reap(Duration::ZERO);
        assert_eq!(reaped, vec!["a".to_string()]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reap_spares_active_sessions() {
        let registry = Registry::new();
        registry.create("a", SessionConfig::new());
        let reaped = registry.reap(Duration::from_secs(3600));
        assert!(reaped.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn reap_collects_dead_sessions_regardless_of_idle_time() {
        let registry = Registry::new();
        registry.create("a", SessionConfig::new());
        {
            let sessions = registry.lock();
            sessions.get("a").unwrap().stop().unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reaped = registry.reap(Duration::from_secs(3600));
        assert_eq!(reaped, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn sweeper_runs_in_the_background() {
        let registry = Arc::new(Registry::new());
        registry.create("a", SessionConfig::new());
        let sweeper = registry.spawn_sweeper(Duration::from_millis(10), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.is_empty());
        sweeper.abort();
    }
}
