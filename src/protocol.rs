//! Wire types exchanged between clients and a session.
//!
//! Inbound traffic is a [`Command`]: a kind, the sender's persistent
//! identity, a freshness version stamp, and an opaque JSON payload the
//! phase handlers decode themselves. Outbound traffic is an [`Outbound`]
//! envelope: either the full-state broadcast (`"all"`) or a single-recipient
//! error notice (`"msg"`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::connector::ConnectionHandle;

/// Persistent player identity, stable across reconnects. Issued by the
/// transport layer (typically from a cookie) and never broadcast.
pub type PlayerUuid = Uuid;

// ── Commands ────────────────────────────────────────────────────────

/// Recognized command kinds.
///
/// Unknown kinds deserialize to [`Unknown`](CommandKind::Unknown) and are
/// logged and ignored by the session loop without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Enter the session, or rebind the connection of a known player.
    Join,
    /// Remove the player from the roster, regardless of phase.
    Leave,
    /// Mark the player offline but keep their game state.
    Disconnect,
    /// Terminate the session loop.
    Stop,
    /// Set the player's display name.
    Rename,
    /// Begin the game from the lobby.
    Start,
    /// Draft-phase pick: an index into the remaining character deck.
    Choose,
    /// Economy-phase choice (gold-or-draw, then put-card-back).
    Action,
    /// Build-phase choice: a hand index, or −1 to skip.
    Build,
    /// Special-ability choice for the acting character.
    Powers,
    /// Anything else. Logged and dropped.
    #[serde(other)]
    Unknown,
}

/// One inbound unit of work for a session.
///
/// `version` is the freshness stamp: a command whose version does not equal
/// the session's current version is discarded without effect or reply, which
/// keeps actions issued against out-of-date client UI state from racing the
/// canonical state.
#[derive(Debug, Clone)]
pub struct Command {
    /// What to do.
    pub kind: CommandKind,
    /// Persistent identity of the sender.
    pub sender: PlayerUuid,
    /// Freshness stamp; must equal the session's current version.
    pub version: u64,
    /// Opaque payload, decoded by the handler for `kind`.
    pub data: Value,
    /// Reply handle for rejection notices. Also bound into the roster on
    /// `join`.
    pub conn: Option<ConnectionHandle>,
}

impl Command {
    /// Build a command with no payload and no reply handle.
    pub fn new(kind: CommandKind, sender: PlayerUuid, version: u64) -> Self {
        Command {
            kind,
            sender,
            version,
            data: Value::Null,
            conn: None,
        }
    }

    /// Attach a JSON payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// Attach the sender's connection as the reply handle.
    #[must_use]
    pub fn with_connection(mut self, conn: ConnectionHandle) -> Self {
        self.conn = Some(conn);
        self
    }

    /// An internally-generated command (registry stop, sweeps). Uses the nil
    /// identity and carries no reply handle.
    pub fn internal(kind: CommandKind, version: u64) -> Self {
        Command::new(kind, Uuid::nil(), version)
    }
}

// ── Outbound envelopes ──────────────────────────────────────────────

/// The per-recipient private section of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateView {
    /// The recipient's sequential numeric id.
    pub id: u32,
    /// Whether the recipient holds the crown.
    pub has_crown: bool,
}

/// Message types sent from a session to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outbound {
    /// Full session snapshot plus the recipient's private view. Sent to every
    /// connected player after each accepted mutation.
    All {
        /// The serialized session snapshot. Excludes persistent identities,
        /// network origins, and per-player scores.
        state: Value,
        /// The recipient's private view.
        private: PrivateView,
    },
    /// An error notice for one rejected command. Never broadcast.
    Msg {
        /// Human-readable rejection text.
        text: String,
    },
}

impl Outbound {
    /// Build an error notice.
    pub fn notice(text: impl Into<String>) -> Self {
        Outbound::Msg { text: text.into() }
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
    use serde_json::json;

    #[test]
    fn command_kinds_use_lowercase_wire_names() {
        for (kind, wire) in [
            (CommandKind::Join, "join"),
            (CommandKind::Leave, "leave"),
            (CommandKind::Disconnect, "disconnect"),
            (CommandKind::Stop, "stop"),
            (CommandKind::Rename, "rename"),
            (CommandKind::Start, "start"),
            (CommandKind::Choose, "choose"),
            (CommandKind::Action, "action"),
            (CommandKind::Build, "build"),
            (CommandKind::Powers, "powers"),
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(wire));
            assert_eq!(
                serde_json::from_value::<CommandKind>(json!(wire)).unwrap(),
                kind
            );
        }
    }

    #[test]
    fn unrecognized_kind_maps_to_unknown() {
        let kind: CommandKind = serde_json::from_value(json!("frobnicate")).unwrap();
        assert_eq!(kind, CommandKind::Unknown);
    }

    #[test]
    fn broadcast_envelope_shape() {
        let msg = Outbound::All {
            state: json!({"phase": "lobby"}),
            private: PrivateView {
                id: 3,
                has_crown: true,
            },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "kind": "all",
                "state": {"phase": "lobby"},
                "private": {"id": 3, "hasCrown": true},
            })
        );
    }

    #[test]
    fn notice_envelope_shape() {
        let msg = Outbound::notice("Not your turn yet");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"kind": "msg", "text": "Not your turn yet"})
        );
    }

    #[test]
    fn internal_commands_use_nil_sender() {
        let cmd = Command::internal(CommandKind::Stop, 7);
        assert_eq!(cmd.sender, Uuid::nil());
        assert_eq!(cmd.version, 7);
        assert!(cmd.conn.is_none());
        assert_eq!(cmd.data, Value::Null);
    }
}
