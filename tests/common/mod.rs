#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for session integration tests.
//!
//! Provides a recording [`MockConnector`] plus helpers for picking apart the
//! outbound traffic each player received.

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use parlor_host::{ConnectionHandle, Connector, Outbound};
use serde_json::Value;

static INIT: Once = Once::new();

/// Install the env-filter subscriber once so `RUST_LOG` works in tests.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Recorded outbound traffic for one mock client.
pub type Sent = Arc<Mutex<Vec<Outbound>>>;

/// A connector that records every message the session sends to its client.
pub struct MockConnector {
    sent: Sent,
}

impl MockConnector {
    /// Create a connection handle plus the shared record of sent messages.
    pub fn new() -> (ConnectionHandle, Sent) {
        let sent: Sent = Arc::new(Mutex::new(Vec::new()));
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
        "198.51.100.1".to_string()
    }
}

/// Give the session loop a moment to drain its queue.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

/// The `state` of the most recent broadcast this client received.
pub fn last_state(sent: &Sent) -> Value {
    sent.lock()
        .unwrap()
        .iter()
        .rev()
        .find_map(|msg| match msg {
            Outbound::All { state, .. } => Some(state.clone()),
            Outbound::Msg { .. } => None,
        })
        .expect("no broadcast received")
}

/// How many full-state broadcasts this client has received.
pub fn broadcast_count(sent: &Sent) -> usize {
    sent.lock()
        .unwrap()
        .iter()
        .filter(|msg| matches!(msg, Outbound::All { .. }))
        .count()
}

/// Every notice text this client has received, in order.
pub fn notices(sent: &Sent) -> Vec<String> {
    sent.lock()
        .unwrap()
        .iter()
        .filter_map(|msg| match msg {
            Outbound::Msg { text } => Some(text.clone()),
            Outbound::All { .. } => None,
        })
        .collect()
}

/// The `private` section of the most recent broadcast this client received.
pub fn last_private(sent: &Sent) -> parlor_host::PrivateView {
    sent.lock()
        .unwrap()
        .iter()
        .rev()
        .find_map(|msg| match msg {
            Outbound::All { private, .. } => Some(private.clone()),
            Outbound::Msg { .. } => None,
        })
        .expect("no broadcast received")
}
