//! Client connection abstraction.
//!
//! The [`Connector`] trait is the only view the session core has of a
//! connected client. Transports (WebSocket framing, read/write deadlines,
//! cookie and IP extraction) live outside this crate; they hand the session a
//! connector per client and feed inbound traffic through the command queue.
//!
//! # Connection Setup
//!
//! Connection setup is intentionally NOT part of this trait — transports have
//! fundamentally different connection parameters. Construct a connected
//! connector externally and attach it to the `join` command for its client.
//!
//! # Implementing a Custom Connector
//!
//! ```rust
//! use parlor_host::connector::Connector;
//! use parlor_host::protocol::Outbound;
//!
//! struct MyConnector { /* outbound queue handle */ }
//!
//! impl Connector for MyConnector {
//!     fn send(&self, _msg: Outbound) {
//!         // Enqueue the message for the client; must not block.
//!     }
//!
//!     fn send_raw(&self, _bytes: Vec<u8>) {
//!         // Enqueue a raw frame for the client; must not block.
//!     }
//!
//!     fn origin(&self) -> String {
//!         "203.0.113.7".to_string()
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::protocol::Outbound;

/// Send-side capability of one connected client.
///
/// # Non-blocking contract
///
/// Session handlers are synchronous and broadcast is fire-and-forget: both
/// [`send`](Connector::send) and [`send_raw`](Connector::send_raw) **MUST NOT**
/// block. Typical implementations push onto an unbounded outbound channel
/// drained by the transport's writer task; a slow or dead client is the
/// transport's problem, never the session's.
///
/// # Object Safety
///
/// The trait is object-safe; the session stores connectors as
/// [`ConnectionHandle`]s (`Arc<dyn Connector>`).
pub trait Connector: Send + Sync + 'static {
    /// Queue one structured message for the client.
    fn send(&self, msg: Outbound);

    /// Queue one raw binary frame for the client.
    fn send_raw(&self, bytes: Vec<u8>);

    /// The client's recorded network origin (forwarded address or peer
    /// address, transport's choice).
    fn origin(&self) -> String;
}

/// Cloneable shared handle to a client's [`Connector`].
///
/// Held by the roster while the player is connected and carried on commands
/// as the reply handle for rejection notices.
#[derive(Clone)]
pub struct ConnectionHandle(Arc<dyn Connector>);

impl ConnectionHandle {
    /// Wrap a connector for the session core.
    pub fn new(connector: impl Connector) -> Self {
        ConnectionHandle(Arc::new(connector))
    }

    /// Wrap an already-shared connector.
    pub fn from_arc(connector: Arc<dyn Connector>) -> Self {
        ConnectionHandle(connector)
    }

    /// Queue one structured message for the client.
    pub fn send(&self, msg: Outbound) {
        self.0.send(msg);
    }

    /// Queue one raw binary frame for the client.
    pub fn send_raw(&self, bytes: Vec<u8>) {
        self.0.send_raw(bytes);
    }

    /// The client's recorded network origin.
    pub fn origin(&self) -> String {
        self.0.origin()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionHandle").finish()
    }
}
