//! # Parlor Host
//!
//! Transport-agnostic session host for real-time turn-based party games.
//!
//! Each game session is an isolated actor: one background task owns all
//! session state and consumes client commands from an ordered queue, one at a
//! time to completion. Every accepted mutation is followed by a full-state
//! broadcast to all connected players. There are no locks and no
//! transactions — single-writer ordering alone provides linearizable
//! semantics.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Connector`] trait for any
//!   backend; the core never sees sockets or framing
//! - **Single-writer sessions** — commands serialize through an MPSC queue
//!   into one owning task per session
//! - **Strict validation** — freshness, phase legality, turn ownership, and
//!   resource constraints are checked before any mutation commits
//! - **Observable health** — faults halt a session permanently and are
//!   surfaced to the registry as structured records, not exceptions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parlor_host::{Command, CommandKind, Registry, SessionConfig};
//!
//! let registry = std::sync::Arc::new(Registry::new());
//! registry.create("table-1", SessionConfig::new());
//! registry.spawn_sweeper(
//!     std::time::Duration::from_secs(60),
//!     std::time::Duration::from_secs(30 * 60),
//! );
//!
//! // The transport layer feeds decoded client commands in:
//! let version = registry.version_of("table-1").unwrap_or(0);
//! registry.submit(
//!     "table-1",
//!     Command::new(CommandKind::Join, player_uuid, version).with_connection(conn),
//! )?;
//! ```

pub mod cards;
pub mod connector;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod roster;
pub mod session;
pub mod state;

mod draft;
mod special;
mod turns;

// Re-export primary types for ergonomic imports.
pub use connector::{ConnectionHandle, Connector};
pub use error::SessionError;
pub use protocol::{Command, CommandKind, Outbound, PrivateView};
pub use registry::Registry;
pub use roster::Player;
pub use session::{FaultRecord, Session, SessionConfig, SessionHealth};
pub use state::{GameState, Phase};

pub use turns::COMPLETION_THRESHOLD;
