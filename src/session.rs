//! The session actor.
//!
//! [`Session`] is a thin handle over a background loop task that has
//! exclusive ownership of one [`GameState`]. Commands flow to the loop over
//! an unbounded MPSC channel and are processed strictly one at a time to
//! completion, which is the sole source of the host's consistency guarantees:
//! one writer, ordered queue, no locks.
//!
//! # Example
//!
//! ```rust,ignore
//! let session = Session::spawn("lobby-1", SessionConfig::new());
//!
//! session.submit(
//!     Command::new(CommandKind::Join, player_uuid, session.version())
//!         .with_connection(conn),
//! )?;
//!
//! // ... later, from the registry's idle sweep:
//! session.stop()?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{Result, SessionError};
use crate::protocol::{Command, CommandKind};
use crate::state::GameState;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`Session`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use parlor_host::session::SessionConfig;
///
/// let config = SessionConfig::new()
///     .with_seed(42)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.seed, Some(42));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// RNG seed for deck and seating permutations. `None` (the default)
    /// seeds from entropy; fix it for deterministic tests.
    pub seed: Option<u64>,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`Session::shutdown`] is called, the loop is given this much time
    /// to process the stop command before the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl SessionConfig {
    /// A configuration with default values.
    pub fn new() -> Self {
        SessionConfig {
            seed: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Fix the RNG seed for deterministic shuffles.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::new()
    }
}

// ── Health ──────────────────────────────────────────────────────────

/// Structured record of a session fault, kept for the registry and
/// diagnostics after the loop has halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    /// What invariant broke.
    pub message: String,
    /// The kind of the command being handled when it broke.
    pub command: CommandKind,
}

/// Observable state of a session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionHealth {
    /// The loop is alive and processing commands.
    Running,
    /// The loop exited normally (stop command or shutdown).
    Stopped,
    /// The loop halted on an invariant break and will never process another
    /// command.
    Faulted(FaultRecord),
}

/// Shared between the handle and the loop: the loop writes, handles and the
/// registry read.
struct SessionShared {
    running: AtomicBool,
    version: AtomicU64,
    fault: Mutex<Option<FaultRecord>>,
    updated: Mutex<Instant>,
}

impl SessionShared {
    fn new() -> Self {
        SessionShared {
            running: AtomicBool::new(true),
            version: AtomicU64::new(0),
            fault: Mutex::new(None),
            updated: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.updated.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.updated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn record_fault(&self, record: FaultRecord) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(record);
    }

    fn health(&self) -> SessionHealth {
        let fault = self
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match fault {
            Some(record) => SessionHealth::Faulted(record),
            None if self.running.load(Ordering::Acquire) => SessionHealth::Running,
            None => SessionHealth::Stopped,
        }
    }
}

// ── Session handle ──────────────────────────────────────────────────

/// Handle to one running game session.
///
/// Created via [`Session::spawn`], which starts the loop task and returns
/// this handle. All mutation goes through [`submit`](Session::submit); the
/// handle itself never touches game state.
pub struct Session {
    id: String,
    /// Sender half of the command channel into the loop.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Observable state written by the loop.
    shared: Arc<SessionShared>,
    /// Handle to the loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl Session {
    /// Spawn a new session loop and return its handle.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(id: impl Into<String>, config: SessionConfig) -> Self {
        let id = id.into();
        let state = GameState::new(id.clone(), config.seed);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let shared = Arc::new(SessionShared::new());
        let task = tokio::spawn(session_loop(state, cmd_rx, Arc::clone(&shared)));
        Session {
            id,
            cmd_tx,
            shared,
            task: Some(task),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// The session's registry id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enqueue a command for the loop. Returns immediately once queued.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Stopped`] if the loop has exited or faulted.
    pub fn submit(&self, cmd: Command) -> Result<()> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(SessionError::Stopped);
        }
        self.cmd_tx.send(cmd).map_err(|_| SessionError::Stopped)
    }

    /// Ask the loop to terminate. The stop command is stamped with the
    /// current version so the freshness filter lets it through.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Stopped`] if the loop has already exited.
    pub fn stop(&self) -> Result<()> {
        self.submit(Command::internal(CommandKind::Stop, self.version()))
    }

    /// The session's current freshness version. Commands must carry this
    /// value to pass the staleness filter.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }

    /// Observable loop state.
    pub fn health(&self) -> SessionHealth {
        self.shared.health()
    }

    /// `true` while the loop is alive.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Time since the last accepted mutation (or since spawn).
    pub fn idle_for(&self) -> Duration {
        self.shared.idle_for()
    }

    /// Stop the session and wait for the loop to exit.
    ///
    /// The loop is given [`SessionConfig::shutdown_timeout`] to drain; past
    /// that the task is aborted so it cannot detach and run indefinitely.
    pub async fn shutdown(&mut self) {
        debug!(session = %self.id, "shutdown requested");
        let _ = self.stop();
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!(session = %self.id, "session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!(session = %self.id, "session loop did not exit within timeout; aborting");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!(session = %self.id, "session loop aborted: {join_err}");
                    }
                }
            }
        }
        self.shared.running.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("health", &self.health())
            .field("version", &self.version())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // `Drop` is synchronous, so a graceful stop cannot be awaited here.
        // Aborting the task drops the loop future and the game state with it.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// The single-writer loop. Owns the [`GameState`] for its whole life.
///
/// Exits when:
/// - a fresh `stop` command arrives
/// - the command channel closes (handle dropped)
/// - a handler reports a fault
async fn session_loop(
    mut state: GameState,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<SessionShared>,
) {
    debug!(session = %state.id, "session loop started");

    while let Some(cmd) = cmd_rx.recv().await {
        // Stale-command filter: silently drop anything issued against an
        // out-of-date view. No notice — these are benign UI races.
        if cmd.version != state.version {
            debug!(
                session = %state.id,
                got = cmd.version,
                current = state.version,
                "dropping stale command"
            );
            continue;
        }
        if cmd.kind == CommandKind::Stop {
            debug!(session = %state.id, "stop command received");
            break;
        }

        match state.dispatch(&cmd) {
            Ok(true) => {
                state.version += 1;
                shared.version.store(state.version, Ordering::Release);
                state.broadcast();
                shared.touch();
            }
            Ok(false) => {}
            Err(err) if err.is_fault() => {
                error!(
                    session = %state.id,
                    state = ?state,
                    command = ?cmd,
                    error = %err,
                    "session faulted, halting loop"
                );
                shared.record_fault(FaultRecord {
                    message: err.to_string(),
                    command: cmd.kind,
                });
                shared.running.store(false, Ordering::Release);
                return;
            }
            Err(err) => {
                state.notify_rejection(&cmd, &err);
            }
        }
    }

    shared.running.store(false, Ordering::Release);
    debug!(session = %state.id, "session loop exited");
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
    use crate::connector::{ConnectionHandle, Connector};
    use crate::protocol::Outbound;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    /// A connector that records every outbound message.
    struct MockConnector {
        sent: Arc<StdMutex<Vec<Outbound>>>,
    }

    impl MockConnector {
        fn new() -> (ConnectionHandle, Arc<StdMutex<Vec<Outbound>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let handle = ConnectionHandle::new(MockConnector {
                sent: Arc::clone(&sent),
            });
            (handle, sent)
        }
    }

    impl Connector for MockConnector {
        fn send(&self, msg: Outbound) {
            self.sent.lock().unwrap().push(msg);
        }

        fn send_raw(&self, _bytes: Vec<u8>) {}

        fn origin(&self) -> String {
            "test".into()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn join_is_broadcast_to_connected_players() {
        let mut session = Session::spawn("s1", SessionConfig::new().with_seed(1));
        let (conn, sent) = MockConnector::new();
        session
            .submit(Command::new(CommandKind::Join, Uuid::new_v4(), 0).with_connection(conn))
            .unwrap();
        settle().await;

        assert_eq!(session.version(), 1);
        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1);
            assert!(matches!(messages[0], Outbound::All { .. }));
        }
        session.shutdown().await;
    }

    #[tokio::test]
    async fn stale_commands_change_nothing() {
        let mut session = Session::spawn("s1", SessionConfig::new().with_seed(1));
        let (conn, sent) = MockConnector::new();
        session
            .submit(
                Command::new(CommandKind::Join, Uuid::new_v4(), 99).with_connection(conn),
            )
            .unwrap();
        settle().await;

        assert_eq!(session.version(), 0);
        assert!(sent.lock().unwrap().is_empty());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn rejections_notify_only_the_sender() {
        let mut session = Session::spawn("s1", SessionConfig::new().with_seed(1));
        let (conn_a, sent_a) = MockConnector::new();
        let (conn_b, sent_b) = MockConnector::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        session
            .submit(Command::new(CommandKind::Join, a, 0).with_connection(conn_a))
            .unwrap();
        settle().await;
        session
            .submit(Command::new(CommandKind::Join, b, 1).with_connection(conn_b))
            .unwrap();
        settle().await;

        let broadcasts_b = sent_b.lock().unwrap().len();

        // A starts the game; B's follow-up start hits the draft phase.
        session
            .submit(Command::new(CommandKind::Start, a, 2))
            .unwrap();
        settle().await;
        session
            .submit(Command::new(CommandKind::Start, b, 3))
            .unwrap();
        settle().await;

        // The second start was rejected: B got a notice, A got nothing new,
        // and no broadcast went out for it.
        let a_msgs = sent_a.lock().unwrap();
        let b_msgs = sent_b.lock().unwrap();
        assert!(matches!(b_msgs.last(), Some(Outbound::Msg { .. })));
        assert!(a_msgs.iter().all(|m| matches!(m, Outbound::All { .. })));
        assert_eq!(
            b_msgs
                .iter()
                .filter(|m| matches!(m, Outbound::All { .. }))
                .count(),
            broadcasts_b + 1,
            "only the accepted start broadcast"
        );
        drop(a_msgs);
        drop(b_msgs);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn stop_ends_the_loop() {
        let mut session = Session::spawn("s1", SessionConfig::new());
        assert!(session.is_running());
        session.stop().unwrap();
        settle().await;
        assert!(!session.is_running());
        assert_eq!(session.health(), SessionHealth::Stopped);

        let err = session
            .submit(Command::new(CommandKind::Join, Uuid::new_v4(), 0))
            .unwrap_err();
        assert!(matches!(err, SessionError::Stopped));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut session = Session::spawn("s1", SessionConfig::new());
        session.shutdown().await;
        session.shutdown().await;
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = SessionConfig::new();
        assert_eq!(config.seed, None);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }
}
