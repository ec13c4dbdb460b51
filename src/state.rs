//! Session game state and command dispatch.
//!
//! [`GameState`] is the synchronous, single-writer core: every mutation goes
//! through [`GameState::dispatch`], which validates first and commits only on
//! success. The async actor in [`crate::session`] owns exactly one
//! `GameState` and feeds it commands one at a time; nothing else ever holds a
//! reference to it.
//!
//! The snapshot broadcast serializes this state directly. Fields that must
//! never reach clients (persistent identities, network origins, scores, the
//! RNG) are excluded with `#[serde(skip)]` at the type level, so there is no
//! separate projection to keep in sync.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::cards::CHARACTER_COUNT;
use crate::error::{Result, SessionError};
use crate::protocol::{Command, CommandKind, Outbound, PrivateView};
use crate::roster::Player;

/// The session's phase. Commands are legal only in specific phases; see the
/// handler for each command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Pre-start: players join, leave, and rename freely.
    Lobby,
    /// The role draft for the next round.
    Draft,
    /// Acting player takes 2 gold or draws 2 district cards.
    GoldOrDraw,
    /// Acting player returns one of the two just-drawn cards.
    PutCardBack,
    /// Acting player may build one district from hand.
    Build,
    /// Acting player resolves their character's special ability.
    Special,
    /// Terminal: somebody completed their city. No command advances phase.
    End,
}

/// A counter over `0..max` that returns its current value and then wraps.
///
/// Tracks which seat leads the next round's draft. `max` is the seated player
/// count; advancing from `max - 1` wraps to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Circular {
    pub value: usize,
    pub max: usize,
}

impl Circular {
    /// A fresh counter at 0 over `0..max`.
    pub fn new(max: usize) -> Self {
        Circular { value: 0, max }
    }

    /// Post-increment: returns the current value, then advances with
    /// wrap-around at `max`.
    pub fn inc(&mut self) -> usize {
        let rv = self.value;
        self.value += 1;
        if self.value >= self.max {
            self.value = 0;
        }
        rv
    }
}

/// Complete state of one game session.
///
/// Owned exclusively by the session actor. Serializing this type produces the
/// snapshot broadcast to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Session identifier, as registered with the registry.
    pub id: String,
    /// Roster in seating order. Unique by persistent identity.
    pub players: Vec<Player>,
    /// Whose turn: a seat index during the draft, a role-slot index during
    /// the per-turn phases. The asymmetry is inherited game behavior.
    pub turn: usize,
    /// Current phase.
    pub phase: Phase,
    /// Remaining undrafted character ids, in deal order.
    pub character_deck: Vec<usize>,
    /// Remaining district card ids; the front is the top of the deck.
    pub district_deck: Vec<usize>,
    /// Which seat leads the next round's draft.
    pub crown: Circular,
    /// Role-slot table: one entry per archetype rank, holding the numeric id
    /// of the player who drafted it this round.
    pub roles: [Option<u32>; CHARACTER_COUNT],
    /// Numeric id of the first player to reach 8 built districts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_to_eight: Option<u32>,
    /// Role slot assassinated this round; skipped in turn order.
    pub kill: Option<usize>,
    /// Freshness version. Bumped by the actor on every accepted mutation;
    /// commands must echo it.
    pub version: u64,

    /// Next sequential player id. Assigned once, never reused.
    #[serde(skip)]
    pub(crate) player_cursor: u32,
    #[serde(skip)]
    pub(crate) rng: StdRng,
}

impl GameState {
    /// A fresh session in the lobby phase. `seed` fixes the RNG for
    /// deterministic shuffles in tests; `None` seeds from entropy.
    pub fn new(id: impl Into<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut state = GameState {
            id: id.into(),
            players: Vec::new(),
            turn: 0,
            phase: Phase::Lobby,
            character_deck: Vec::new(),
            district_deck: Vec::new(),
            crown: Circular::new(0),
            roles: [None; CHARACTER_COUNT],
            first_to_eight: None,
            kill: None,
            version: 0,
            player_cursor: 1,
            rng,
        };
        state.reset();
        state
    }

    /// Return to the lobby baseline: decks restored to their unshuffled
    /// identity order, role slots and round markers cleared, every player
    /// back to starting economy.
    pub(crate) fn reset(&mut self) {
        self.character_deck = (0..CHARACTER_COUNT).collect();
        self.district_deck = (0..crate::cards::DISTRICTS.len()).collect();
        self.roles = [None; CHARACTER_COUNT];
        self.crown = Circular::new(self.players.len());
        self.phase = Phase::Lobby;
        self.turn = 0;
        self.kill = None;
        self.first_to_eight = None;
        for player in &mut self.players {
            player.gold = 2;
            player.has_crown = false;
        }
    }

    /// Validate and apply one command. Returns whether observable state
    /// changed (and therefore whether the actor must broadcast).
    ///
    /// Freshness filtering and `stop` are the loop's responsibility; by the
    /// time a command reaches here its version already matched.
    pub fn dispatch(&mut self, cmd: &Command) -> Result<bool> {
        match cmd.kind {
            CommandKind::Join => self.handle_join(cmd),
            CommandKind::Leave => self.handle_leave(cmd),
            CommandKind::Disconnect => self.handle_disconnect(cmd),
            CommandKind::Rename => self.handle_rename(cmd),
            CommandKind::Start => self.handle_start(cmd),
            CommandKind::Choose => self.handle_choose(cmd),
            CommandKind::Action => self.handle_action(cmd),
            CommandKind::Build => self.handle_build(cmd),
            CommandKind::Powers => self.handle_powers(cmd),
            CommandKind::Stop => Ok(false),
            CommandKind::Unknown => {
                warn!(session = %self.id, "unknown command kind, ignoring");
                Ok(false)
            }
        }
    }

    /// Serialize the canonical snapshot clients receive.
    pub fn snapshot(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Push the current snapshot to every connected player, wrapped with each
    /// recipient's private view. Fire-and-forget: a slow client never blocks
    /// the session.
    pub fn broadcast(&self) {
        let state = match self.snapshot() {
            Ok(state) => state,
            Err(err) => {
                warn!(session = %self.id, error = %err, "failed to serialize snapshot");
                return;
            }
        };
        for player in &self.players {
            if let Some(conn) = &player.conn {
                conn.send(Outbound::All {
                    state: state.clone(),
                    private: PrivateView {
                        id: player.id,
                        has_crown: player.has_crown,
                    },
                });
            }
        }
    }

    /// Send a rejection notice for a command. Prefers the command's reply
    /// handle, falling back to the sender's bound connection. Never
    /// broadcast.
    pub(crate) fn notify_rejection(&self, cmd: &Command, err: &SessionError) {
        let conn = cmd.conn.clone().or_else(|| {
            self.find(cmd.sender)
                .and_then(|seat| self.players.get(seat))
                .and_then(|player| player.conn.clone())
        });
        if let Some(conn) = conn {
            conn.send(Outbound::notice(err.to_string()));
        }
    }

    /// Take the top `n` cards off the district deck, or `None` if fewer
    /// remain.
    pub(crate) fn draw_districts(&mut self, n: usize) -> Option<Vec<usize>> {
        if self.district_deck.len() < n {
            return None;
        }
        Some(self.district_deck.drain(0..n).collect())
    }

    /// Decode a command payload as a single integer choice.
    pub(crate) fn choice(cmd: &Command) -> Result<i64> {
        serde_json::from_value(cmd.data.clone()).map_err(SessionError::from)
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
    use uuid::Uuid;

    #[test]
    fn circular_wraps_at_max() {
        let mut crown = Circular::new(3);
        let returned: Vec<usize> = (0..7).map(|_| crown.inc()).collect();
        assert_eq!(returned, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn circular_advancing_max_plus_one_times_wraps_to_first_value() {
        let k = 4;
        let mut crown = Circular::new(k);
        let mut last = 0;
        for _ in 0..k + 1 {
            last = crown.inc();
        }
        // k+1 advances land back where the first advance did.
        assert_eq!(last, 0);
    }

    #[test]
    fn fresh_state_is_an_empty_lobby() {
        let state = GameState::new("g1", Some(1));
        assert_eq!(state.phase, Phase::Lobby);
        assert!(state.players.is_empty());
        assert_eq!(state.character_deck.len(), CHARACTER_COUNT);
        assert_eq!(state.version, 0);
    }

    #[test]
    fn snapshot_hides_private_fields() {
        let mut state = GameState::new("g1", Some(1));
        let cmd = Command::new(CommandKind::Join, Uuid::new_v4(), 0);
        state.dispatch(&cmd).unwrap();

        let snap = state.snapshot().unwrap();
        let player = &snap["players"][0];
        assert!(player.get("uuid").is_none());
        assert!(player.get("origin").is_none());
        assert!(player.get("score").is_none());
        assert!(player.get("conn").is_none());
        // Public fields survive.
        assert_eq!(player["id"], json!(1));
        assert_eq!(snap["phase"], json!("lobby"));
    }

    #[test]
    fn draw_refuses_to_overdraw() {
        let mut state = GameState::new("g1", Some(1));
        state.district_deck = vec![1, 2, 3];
        assert!(state.draw_districts(4).is_none());
        assert_eq!(state.draw_districts(2), Some(vec![1, 2]));
        assert_eq!(state.district_deck, vec![3]);
    }

    #[test]
    fn unknown_kind_is_ignored_without_effect() {
        let mut state = GameState::new("g1", Some(1));
        let cmd = Command::new(CommandKind::Unknown, Uuid::new_v4(), 0);
        assert!(!state.dispatch(&cmd).unwrap());
        assert!(state.players.is_empty());
    }

    #[test]
    fn malformed_choice_payload_is_rejected() {
        let cmd = Command::new(CommandKind::Choose, Uuid::new_v4(), 0)
            .with_data(json!({"not": "an int"}));
        assert!(matches!(
            GameState::choice(&cmd),
            Err(SessionError::MalformedPayload(_))
        ));
    }
}
