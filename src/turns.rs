//! Per-turn economy and build handlers.
//!
//! After the draft, `turn` indexes the role-slot table: the acting player is
//! whoever drafted the slot at the current turn index. Each turn runs
//! gold-or-draw, optionally put-card-back, then build, then the character's
//! special ability.

use crate::cards::district;
use crate::error::{Result, SessionError};
use crate::protocol::{Command, PlayerUuid};
use crate::state::{GameState, Phase};

/// Built districts that end the game (and mark `first_to_eight`).
pub const COMPLETION_THRESHOLD: usize = 8;

impl GameState {
    /// Resolve the sender against the role slot that owns the current turn.
    /// Returns the acting seat, or a turn-ownership rejection.
    ///
    /// An unoccupied slot owning the turn mid-round is unreachable through
    /// any command sequence and faults the session.
    pub(crate) fn acting_seat(&self, sender: PlayerUuid) -> Result<usize> {
        let owner = self
            .roles
            .get(self.turn)
            .ok_or_else(|| SessionError::fault("turn index outside the role table"))?
            .ok_or_else(|| SessionError::fault("turn on an unoccupied role slot"))?;
        let seat = self.find(sender).ok_or(SessionError::TurnViolation)?;
        let player = self
            .players
            .get(seat)
            .ok_or_else(|| SessionError::fault("sender seat out of range"))?;
        if player.id != owner {
            return Err(SessionError::TurnViolation);
        }
        Ok(seat)
    }

    /// `action`: the turn economy. In gold-or-draw, choice 0 takes 2 gold and
    /// skips to build; anything else draws the top 2 districts and moves to
    /// put-card-back. In put-card-back, choice 0 keeps the second-drawn card
    /// in place of the first; anything else discards the most recent draw.
    pub(crate) fn handle_action(&mut self, cmd: &Command) -> Result<bool> {
        if !matches!(self.phase, Phase::GoldOrDraw | Phase::PutCardBack) {
            return Err(SessionError::IllegalPhase("It's not time for actions"));
        }
        let seat = self.acting_seat(cmd.sender)?;
        let choice = Self::choice(cmd)?;

        if self.phase == Phase::GoldOrDraw {
            if choice == 0 {
                if let Some(player) = self.players.get_mut(seat) {
                    player.gold += 2;
                }
                self.phase = Phase::Build;
                return Ok(true);
            }
            let drawn = self
                .draw_districts(2)
                .ok_or_else(|| SessionError::domain("Not enough cards left in the deck"))?;
            if let Some(player) = self.players.get_mut(seat) {
                player.hand.extend(drawn);
            }
            self.phase = Phase::PutCardBack;
            return Ok(true);
        }

        let player = self
            .players
            .get_mut(seat)
            .ok_or_else(|| SessionError::fault("acting seat out of range"))?;
        let last = player
            .hand
            .pop()
            .ok_or_else(|| SessionError::fault("put-card-back with an empty hand"))?;
        if choice == 0 {
            // Keep the most recent draw in place of the one before it.
            let kept = player
                .hand
                .last_mut()
                .ok_or_else(|| SessionError::fault("put-card-back with a single-card hand"))?;
            *kept = last;
        }
        self.phase = Phase::Build;
        Ok(true)
    }

    /// `build`: −1 skips; otherwise the choice indexes the acting player's
    /// hand. Gold and the no-duplicate rule are checked before anything
    /// moves. Hand removal is swap-with-last; hand order is not preserved.
    pub(crate) fn handle_build(&mut self, cmd: &Command) -> Result<bool> {
        if self.phase != Phase::Build {
            return Err(SessionError::IllegalPhase("It's not time to build"));
        }
        let seat = self.acting_seat(cmd.sender)?;
        let choice = Self::choice(cmd)?;

        if choice == -1 {
            self.phase = Phase::Special;
            return Ok(true);
        }
        let index =
            usize::try_from(choice).map_err(|_| SessionError::domain("Invalid choice"))?;

        let player = self
            .players
            .get_mut(seat)
            .ok_or_else(|| SessionError::fault("acting seat out of range"))?;
        let card_id = player
            .hand
            .get(index)
            .copied()
            .ok_or_else(|| SessionError::domain("Invalid choice"))?;
        let card = district(card_id)
            .ok_or_else(|| SessionError::fault("hand holds an unknown district id"))?;
        if player.gold < card.cost {
            return Err(SessionError::domain("You can't afford that district"));
        }
        if player.has_built(card.name) {
            return Err(SessionError::domain("Can't have duplicate districts"));
        }

        player.gold -= card.cost;
        player.hand.swap_remove(index);
        player.districts.push(card_id);
        let completed = player.districts.len() >= COMPLETION_THRESHOLD;
        let builder = player.id;
        if completed && self.first_to_eight.is_none() {
            self.first_to_eight = Some(builder);
        }
        self.phase = Phase::Special;
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
    use crate::cards::DISTRICTS;
    use crate::protocol::CommandKind;
    use serde_json::json;
    use uuid::Uuid;

    /// A 2-player state parked at the top of a turn: the sender owns role
    /// slot 0, the other player slot 4.
    fn turn_start() -> (GameState, PlayerUuid, PlayerUuid) {
        let mut state = GameState::new("g", Some(1));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for uuid in [a, b] {
            state
                .dispatch(&Command::new(CommandKind::Join, uuid, 0))
                .unwrap();
        }
        state
            .dispatch(&Command::new(CommandKind::Start, a, 0))
            .unwrap();
        let (acting, other) = (state.players[0].uuid, state.players[1].uuid);
        let acting_id = state.players[0].id;
        let other_id = state.players[1].id;
        state.roles = [None; 8];
        state.roles[0] = Some(acting_id);
        state.roles[4] = Some(other_id);
        state.character_deck.clear();
        state.turn = 0;
        state.phase = Phase::GoldOrDraw;
        (state, acting, other)
    }

    fn action(state: &mut GameState, uuid: PlayerUuid, choice: i64) -> Result<bool> {
        state.dispatch(&Command::new(CommandKind::Action, uuid, 0).with_data(json!(choice)))
    }

    #[test]
    fn choice_zero_takes_two_gold() {
        let (mut state, acting, _) = turn_start();
        action(&mut state, acting, 0).unwrap();
        assert_eq!(state.players[0].gold, 4);
        assert_eq!(state.phase, Phase::Build);
    }

    #[test]
    fn drawing_takes_the_top_two_cards() {
        let (mut state, acting, _) = turn_start();
        let expected: Vec<usize> = state.district_deck[..2].to_vec();
        let deck_before = state.district_deck.len();
        action(&mut state, acting, 1).unwrap();
        assert_eq!(state.phase, Phase::PutCardBack);
        assert_eq!(state.players[0].hand.len(), 6);
        assert_eq!(state.players[0].hand[4..], expected[..]);
        assert_eq!(state.district_deck.len(), deck_before - 2);
    }

    #[test]
    fn put_back_zero_keeps_the_second_draw() {
        let (mut state, acting, _) = turn_start();
        action(&mut state, acting, 1).unwrap();
        let hand = state.players[0].hand.clone();
        let (first_draw, second_draw) = (hand[4], hand[5]);

        action(&mut state, acting, 0).unwrap();
        let hand_after = &state.players[0].hand;
        // Net +1 card: the second draw replaced the first.
        assert_eq!(hand_after.len(), 5);
        assert_eq!(hand_after[4], second_draw);
        assert!(!hand_after.contains(&first_draw));
        assert_eq!(state.phase, Phase::Build);
    }

    #[test]
    fn put_back_nonzero_discards_the_latest_draw() {
        let (mut state, acting, _) = turn_start();
        action(&mut state, acting, 1).unwrap();
        let hand = state.players[0].hand.clone();
        let (first_draw, second_draw) = (hand[4], hand[5]);

        action(&mut state, acting, 3).unwrap();
        let hand_after = &state.players[0].hand;
        assert_eq!(hand_after.len(), 5);
        assert_eq!(hand_after[4], first_draw);
        assert!(!hand_after.contains(&second_draw));
        assert_eq!(state.phase, Phase::Build);
    }

    #[test]
    fn actions_are_rejected_out_of_phase() {
        let (mut state, acting, _) = turn_start();
        state.phase = Phase::Build;
        let err = action(&mut state, acting, 0).unwrap_err();
        assert!(matches!(err, SessionError::IllegalPhase(_)));
    }

    #[test]
    fn non_acting_player_is_rejected() {
        let (mut state, _, other) = turn_start();
        let err = action(&mut state, other, 0).unwrap_err();
        assert!(matches!(err, SessionError::TurnViolation));
        assert_eq!(state.players[1].gold, 2);
    }

    #[test]
    fn unknown_sender_is_a_turn_violation() {
        let (mut state, _, _) = turn_start();
        let err = action(&mut state, Uuid::new_v4(), 0).unwrap_err();
        assert!(matches!(err, SessionError::TurnViolation));
    }

    fn build(state: &mut GameState, uuid: PlayerUuid, choice: i64) -> Result<bool> {
        state.dispatch(&Command::new(CommandKind::Build, uuid, 0).with_data(json!(choice)))
    }

    /// Give the acting player a hand of exactly these district ids.
    fn rig_hand(state: &mut GameState, ids: &[usize]) {
        state.district_deck.retain(|id| !ids.contains(id));
        state.players[0].hand = ids.to_vec();
    }

    fn id_of(name: &str) -> usize {
        DISTRICTS.iter().position(|d| d.name == name).unwrap()
    }

    #[test]
    fn build_debits_exactly_the_cost() {
        let (mut state, acting, _) = turn_start();
        state.phase = Phase::Build;
        let manor = id_of("Manor");
        rig_hand(&mut state, &[manor]);
        state.players[0].gold = 5;

        build(&mut state, acting, 0).unwrap();
        let player = &state.players[0];
        assert_eq!(player.gold, 5 - DISTRICTS[manor].cost);
        assert_eq!(player.districts, vec![manor]);
        assert!(player.hand.is_empty());
        assert_eq!(state.phase, Phase::Special);
    }

    #[test]
    fn build_rejects_unaffordable_districts() {
        let (mut state, acting, _) = turn_start();
        state.phase = Phase::Build;
        let palace = id_of("Palace");
        rig_hand(&mut state, &[palace]);
        state.players[0].gold = 2;

        let err = build(&mut state, acting, 0).unwrap_err();
        assert!(matches!(err, SessionError::DomainViolation(_)));
        assert_eq!(state.players[0].gold, 2);
        assert_eq!(state.players[0].hand, vec![palace]);
        assert_eq!(state.phase, Phase::Build);
    }

    #[test]
    fn build_rejects_duplicate_district_names() {
        let (mut state, acting, _) = turn_start();
        state.phase = Phase::Build;
        let temples: Vec<usize> = DISTRICTS
            .iter()
            .enumerate()
            .filter(|(_, d)| d.name == "Temple")
            .map(|(i, _)| i)
            .collect();
        rig_hand(&mut state, &temples[1..]);
        state.players[0].districts = vec![temples[0]];
        state.players[0].gold = 10;

        let err = build(&mut state, acting, 0).unwrap_err();
        assert!(matches!(err, SessionError::DomainViolation(_)));
        assert_eq!(state.players[0].districts, vec![temples[0]]);
    }

    #[test]
    fn build_skip_advances_to_special() {
        let (mut state, acting, _) = turn_start();
        state.phase = Phase::Build;
        let hand = state.players[0].hand.clone();
        build(&mut state, acting, -1).unwrap();
        assert_eq!(state.phase, Phase::Special);
        assert_eq!(state.players[0].hand, hand);
    }

    #[test]
    fn build_rejects_bad_hand_index() {
        let (mut state, acting, _) = turn_start();
        state.phase = Phase::Build;
        let err = build(&mut state, acting, 99).unwrap_err();
        assert!(matches!(err, SessionError::DomainViolation(_)));
        assert_eq!(state.phase, Phase::Build);
    }

    #[test]
    fn first_to_eight_is_recorded_once() {
        let (mut state, acting, _) = turn_start();
        state.phase = Phase::Build;
        let manor = id_of("Manor");
        rig_hand(&mut state, &[manor]);
        state.players[0].gold = 10;
        // Seven distinct builds already standing.
        let seven: Vec<usize> = [
            "Temple", "Church", "Tavern", "Market", "Docks", "Watchtower", "Prison",
        ]
        .iter()
        .map(|n| id_of(n))
        .collect();
        state.players[0].districts = seven;
        state.first_to_eight = None;

        build(&mut state, acting, 0).unwrap();
        let first = state.players[0].id;
        assert_eq!(state.players[0].districts.len(), 8);
        assert_eq!(state.first_to_eight, Some(first));

        // A later completion does not steal the marker.
        state.first_to_eight = Some(99);
        state.phase = Phase::Build;
        let castle = id_of("Castle");
        rig_hand(&mut state, &[castle]);
        build(&mut state, acting, 0).unwrap();
        assert_eq!(state.first_to_eight, Some(99));
    }
}
