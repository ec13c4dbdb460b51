//! The player roster: join, leave, disconnect, rename.
//!
//! Players are keyed by persistent identity and survive disconnects; only an
//! explicit `leave` removes one. Numeric ids are sequential and never reused.

use serde::Serialize;
use tracing::warn;

use crate::cards::{district, Color};
use crate::connector::ConnectionHandle;
use crate::error::{Result, SessionError};
use crate::protocol::{Command, PlayerUuid};
use crate::state::{GameState, Phase};

/// Hard cap on lobby size. Starting the game still requires 2–7 players.
pub const MAX_ROSTER: usize = 10;

/// Display names are truncated to this many characters.
pub const NAME_LIMIT: usize = 8;

/// One participant. Serializing a player produces its public snapshot form;
/// identity, origin, score, and the connection stay server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Persistent identity, stable across reconnects.
    #[serde(skip)]
    pub uuid: PlayerUuid,
    /// Sequential numeric id, assigned once.
    pub id: u32,
    /// Display name, at most [`NAME_LIMIT`] characters.
    pub name: String,
    /// Whether a connection is currently bound.
    pub connected: bool,
    /// Recorded network origin of the last bound connection.
    #[serde(skip)]
    pub origin: String,
    /// Bots count as seatable even while unconnected.
    pub is_bot: bool,
    /// Crown display flag; moves with the King's ability.
    pub has_crown: bool,
    /// Gold balance.
    pub gold: u32,
    /// District ids held but not built.
    pub hand: Vec<usize>,
    /// District ids built. Never two of the same name.
    pub districts: Vec<usize>,
    /// Round-boundary score. Never serialized: scores are computed only at
    /// round ends and never exposed mid-round.
    #[serde(skip)]
    pub(crate) score: u32,
    /// Live connection, present only while connected.
    #[serde(skip)]
    pub conn: Option<ConnectionHandle>,
}

impl Player {
    pub(crate) fn new(uuid: PlayerUuid, id: u32) -> Self {
        Player {
            uuid,
            id,
            name: String::new(),
            connected: false,
            origin: String::new(),
            is_bot: false,
            has_crown: false,
            gold: 2,
            hand: Vec::new(),
            districts: Vec::new(),
            score: 0,
            conn: None,
        }
    }

    /// Number of built districts of the given color.
    pub fn built_of_color(&self, color: Color) -> u32 {
        self.districts
            .iter()
            .filter(|id| district(**id).is_some_and(|d| d.color == color))
            .count() as u32
    }

    /// Whether a district of this name is already built.
    pub fn has_built(&self, name: &str) -> bool {
        self.districts
            .iter()
            .any(|id| district(*id).is_some_and(|d| d.name == name))
    }
}

impl GameState {
    /// Seat index of the player with this identity.
    pub fn find(&self, uuid: PlayerUuid) -> Option<usize> {
        self.players.iter().position(|p| p.uuid == uuid)
    }

    /// Seat index of the player with this numeric id.
    pub fn find_by_id(&self, id: u32) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    /// `join`: create the player on first contact (lobby only), then bind
    /// the connection. Known identities rebind in any phase — that is how
    /// reconnects work.
    pub(crate) fn handle_join(&mut self, cmd: &Command) -> Result<bool> {
        let seat = match self.find(cmd.sender) {
            Some(seat) => seat,
            None => {
                if self.phase != Phase::Lobby {
                    return Err(SessionError::IllegalPhase("Can't join a game in progress"));
                }
                if self.players.len() >= MAX_ROSTER {
                    return Err(SessionError::domain(format!(
                        "Can't have more than {MAX_ROSTER} players"
                    )));
                }
                let player = Player::new(cmd.sender, self.player_cursor);
                self.player_cursor += 1;
                self.players.push(player);
                self.players.len() - 1
            }
        };
        let player = self
            .players
            .get_mut(seat)
            .ok_or_else(|| SessionError::fault("joined seat out of range"))?;
        player.connected = true;
        if let Some(conn) = &cmd.conn {
            player.origin = conn.origin();
            player.conn = Some(conn.clone());
        }
        Ok(true)
    }

    /// `leave`: remove the player outright, regardless of phase. Distinct
    /// from disconnect; their seat and cards are gone.
    pub(crate) fn handle_leave(&mut self, cmd: &Command) -> Result<bool> {
        match self.find(cmd.sender) {
            Some(seat) => {
                self.players.remove(seat);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// `disconnect`: drop the connection but keep all game state so the
    /// player can reconnect.
    pub(crate) fn handle_disconnect(&mut self, cmd: &Command) -> Result<bool> {
        let Some(seat) = self.find(cmd.sender) else {
            warn!(session = %self.id, "couldn't find player to disconnect");
            return Ok(false);
        };
        if let Some(player) = self.players.get_mut(seat) {
            player.conn = None;
            player.connected = false;
        }
        Ok(true)
    }

    /// `rename`: lobby only, except a player who has never been named may
    /// always claim one. Truncated to [`NAME_LIMIT`] characters.
    pub(crate) fn handle_rename(&mut self, cmd: &Command) -> Result<bool> {
        let Some(seat) = self.find(cmd.sender) else {
            warn!(session = %self.id, "couldn't find player to rename");
            return Ok(false);
        };
        let phase = self.phase;
        let player = self
            .players
            .get_mut(seat)
            .ok_or_else(|| SessionError::fault("rename seat out of range"))?;
        if phase != Phase::Lobby && !player.name.is_empty() {
            return Err(SessionError::IllegalPhase(
                "Wait for the lobby to change your name again",
            ));
        }
        let name: String = serde_json::from_value(cmd.data.clone())?;
        player.name = name.chars().take(NAME_LIMIT).collect();
        Ok(true)
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
    use serde_json::json;
    use uuid::Uuid;

    fn join(state: &mut GameState, uuid: PlayerUuid) {
        state
            .dispatch(&Command::new(CommandKind::Join, uuid, state.version))
            .unwrap();
    }

    #[test]
    fn join_assigns_sequential_ids() {
        let mut state = GameState::new("g", Some(1));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        join(&mut state, a);
        join(&mut state, b);
        assert_eq!(state.players[0].id, 1);
        assert_eq!(state.players[1].id, 2);
        assert_eq!(state.players[0].gold, 2);
    }

    #[test]
    fn rejoining_does_not_duplicate_or_renumber() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        join(&mut state, a);
        assert_eq!(state.players.len(), 1);
        assert_eq!(state.players[0].id, 1);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        state
            .dispatch(&Command::new(CommandKind::Leave, a, 0))
            .unwrap();
        join(&mut state, Uuid::new_v4());
        assert_eq!(state.players[0].id, 2);
    }

    #[test]
    fn unknown_identity_cannot_join_mid_game() {
        let mut state = GameState::new("g", Some(1));
        join(&mut state, Uuid::new_v4());
        state.phase = Phase::Draft;
        let err = state
            .dispatch(&Command::new(CommandKind::Join, Uuid::new_v4(), 0))
            .unwrap_err();
        assert!(matches!(err, SessionError::IllegalPhase(_)));
        assert_eq!(state.players.len(), 1);
    }

    #[test]
    fn known_identity_reconnects_mid_game() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        state.phase = Phase::Build;
        state.players[0].connected = false;
        assert!(state
            .dispatch(&Command::new(CommandKind::Join, a, 0))
            .unwrap());
        assert!(state.players[0].connected);
    }

    #[test]
    fn roster_caps_at_ten() {
        let mut state = GameState::new("g", Some(1));
        for _ in 0..MAX_ROSTER {
            join(&mut state, Uuid::new_v4());
        }
        let err = state
            .dispatch(&Command::new(CommandKind::Join, Uuid::new_v4(), 0))
            .unwrap_err();
        assert!(matches!(err, SessionError::DomainViolation(_)));
        assert_eq!(state.players.len(), MAX_ROSTER);
    }

    #[test]
    fn leave_works_in_any_phase() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        state.phase = Phase::Special;
        assert!(state
            .dispatch(&Command::new(CommandKind::Leave, a, 0))
            .unwrap());
        assert!(state.players.is_empty());
    }

    #[test]
    fn disconnect_preserves_game_state() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        state.players[0].gold = 9;
        state.players[0].hand = vec![3, 4];
        assert!(state
            .dispatch(&Command::new(CommandKind::Disconnect, a, 0))
            .unwrap());
        assert!(!state.players[0].connected);
        assert_eq!(state.players[0].gold, 9);
        assert_eq!(state.players[0].hand, vec![3, 4]);
    }

    #[test]
    fn rename_truncates_to_eight_characters() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        state
            .dispatch(
                &Command::new(CommandKind::Rename, a, 0).with_data(json!("Maximilian the 3rd")),
            )
            .unwrap();
        assert_eq!(state.players[0].name, "Maximili");
    }

    #[test]
    fn rename_locked_outside_lobby_once_named() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        state
            .dispatch(&Command::new(CommandKind::Rename, a, 0).with_data(json!("Al")))
            .unwrap();
        state.phase = Phase::Draft;
        let err = state
            .dispatch(&Command::new(CommandKind::Rename, a, 0).with_data(json!("Bo")))
            .unwrap_err();
        assert!(matches!(err, SessionError::IllegalPhase(_)));
        assert_eq!(state.players[0].name, "Al");
    }

    #[test]
    fn never_named_player_may_rename_mid_game() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        state.phase = Phase::Draft;
        state
            .dispatch(&Command::new(CommandKind::Rename, a, 0).with_data(json!("Bo")))
            .unwrap();
        assert_eq!(state.players[0].name, "Bo");
    }

    #[test]
    fn bad_rename_payload_is_rejected_without_mutation() {
        let mut state = GameState::new("g", Some(1));
        let a = Uuid::new_v4();
        join(&mut state, a);
        let err = state
            .dispatch(&Command::new(CommandKind::Rename, a, 0).with_data(json!(12)))
            .unwrap_err();
        assert!(matches!(err, SessionError::MalformedPayload(_)));
        assert_eq!(state.players[0].name, "");
    }
}
