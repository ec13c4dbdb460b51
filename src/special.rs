//! Character special abilities and round advancement.
//!
//! Every archetype carries its own resolver and dispatch happens by matching
//! on the variant. A resolver validates everything before touching state, so
//! a rejected ability leaves phase and turn exactly as they were. Once the
//! ability resolves, the turn walks to the next occupied role slot in rank
//! order; when none remains the round is scored and either the game ends or
//! a fresh draft begins.

use tracing::debug;

use crate::cards::{district, Character, Color, CHARACTER_COUNT, COLOR_COUNT};
use crate::error::{Result, SessionError};
use crate::protocol::Command;
use crate::state::{GameState, Phase};
use crate::turns::COMPLETION_THRESHOLD;

impl GameState {
    /// `powers`: resolve the acting character's special ability, then chain
    /// into turn advancement. A negative choice declines the ability.
    pub(crate) fn handle_powers(&mut self, cmd: &Command) -> Result<bool> {
        if self.phase != Phase::Special {
            return Err(SessionError::IllegalPhase("It's not time for special powers"));
        }
        let seat = self.acting_seat(cmd.sender)?;
        let choice = Self::choice(cmd)?;
        let character = Character::from_rank(self.turn)
            .ok_or_else(|| SessionError::fault("turn outside the character table"))?;
        character.resolve(self, seat, choice)?;
        self.advance_turn()
    }

    /// Move to the next occupied role slot in ascending rank, skipping the
    /// assassinated slot; with none left, close out the round.
    fn advance_turn(&mut self) -> Result<bool> {
        for slot in self.turn + 1..CHARACTER_COUNT {
            if self.kill == Some(slot) {
                continue;
            }
            if self.roles.get(slot).copied().flatten().is_some() {
                self.turn = slot;
                self.phase = Phase::GoldOrDraw;
                return Ok(true);
            }
        }
        self.finish_round()
    }

    /// Round end: recompute every score, then either finish the game or deal
    /// a new draft with the crown advanced one seat.
    fn finish_round(&mut self) -> Result<bool> {
        let first_to_eight = self.first_to_eight;
        for player in &mut self.players {
            player.score = 0;
            let mut colors = [0u32; COLOR_COUNT];
            for id in &player.districts {
                if let Some(card) = district(*id) {
                    player.score += card.cost;
                    if let Some(count) = colors.get_mut(card.color as usize) {
                        *count += 1;
                    }
                }
            }
            if colors.iter().all(|count| *count > 0) {
                player.score += 3;
            }
            if first_to_eight == Some(player.id) {
                player.score += 4;
            }
        }

        let completed = self
            .players
            .iter()
            .any(|p| p.districts.len() >= COMPLETION_THRESHOLD);
        if completed {
            debug!(session = %self.id, "city completed, game over");
            self.phase = Phase::End;
            return Ok(true);
        }

        self.roles = [None; CHARACTER_COUNT];
        self.character_deck = self.fresh_character_deck();
        self.kill = None;
        self.phase = Phase::Draft;
        self.turn = self.crown.inc();
        Ok(true)
    }
}

impl Character {
    /// Resolve this character's special ability for the player at `seat`.
    ///
    /// Returns `Ok(())` when the ability is accepted (including a negative
    /// choice, which declines it) and a rejection otherwise. Rejections leave
    /// the state untouched.
    pub(crate) fn resolve(self, state: &mut GameState, seat: usize, choice: i64) -> Result<()> {
        if choice < 0 {
            return Ok(());
        }
        match self {
            Character::Assassin => resolve_assassin(state, choice),
            Character::Thief => resolve_thief(state, seat, choice),
            Character::Magician => resolve_magician(state, seat, choice),
            Character::King => resolve_king(state, seat),
            Character::Bishop => collect_income(state, seat, Color::Blue, 0),
            Character::Merchant => collect_income(state, seat, Color::Green, 1),
            Character::Architect => resolve_architect(state, seat),
            Character::Warlord => resolve_warlord(state, seat, choice),
        }
    }
}

/// Assassin: name a later role slot; it is skipped for the rest of the round.
fn resolve_assassin(state: &mut GameState, choice: i64) -> Result<()> {
    let target = usize::try_from(choice).map_err(|_| SessionError::domain("Invalid target"))?;
    if target == Character::Assassin.rank() || target >= CHARACTER_COUNT {
        return Err(SessionError::domain("Invalid target"));
    }
    state.kill = Some(target);
    Ok(())
}

/// Thief: name a role slot past the thief, not the assassinated one; if it is
/// assigned, its player's whole gold balance moves to the thief.
fn resolve_thief(state: &mut GameState, seat: usize, choice: i64) -> Result<()> {
    let target = usize::try_from(choice).map_err(|_| SessionError::domain("Invalid target"))?;
    if target <= Character::Thief.rank() || target >= CHARACTER_COUNT {
        return Err(SessionError::domain("Invalid target"));
    }
    if state.kill == Some(target) {
        return Err(SessionError::domain("Can't rob the assassinated character"));
    }
    let Some(owner) = state.roles.get(target).copied().flatten() else {
        // Face-down or discarded slot: the theft fizzles.
        return Ok(());
    };
    let victim_seat = state
        .find_by_id(owner)
        .ok_or_else(|| SessionError::fault("role slot assigned to an unknown player"))?;
    if victim_seat == seat {
        return Ok(());
    }
    let loot = {
        let victim = state
            .players
            .get_mut(victim_seat)
            .ok_or_else(|| SessionError::fault("victim seat out of range"))?;
        std::mem::take(&mut victim.gold)
    };
    if let Some(thief) = state.players.get_mut(seat) {
        thief.gold += loot;
    }
    Ok(())
}

/// Magician: choice 0 redraws the whole hand from the deck; a positive choice
/// names another player's numeric id and swaps hands with them.
fn resolve_magician(state: &mut GameState, seat: usize, choice: i64) -> Result<()> {
    if choice == 0 {
        let hand_size = state
            .players
            .get(seat)
            .map(|p| p.hand.len())
            .ok_or_else(|| SessionError::fault("acting seat out of range"))?;
        let n = hand_size.min(state.district_deck.len());
        let drawn = state
            .draw_districts(n)
            .ok_or_else(|| SessionError::fault("deck shrank during redraw"))?;
        if let Some(player) = state.players.get_mut(seat) {
            player.hand = drawn;
        }
        return Ok(());
    }
    let target_id = u32::try_from(choice).map_err(|_| SessionError::domain("Invalid target"))?;
    let target_seat = state
        .find_by_id(target_id)
        .ok_or_else(|| SessionError::domain("Invalid target"))?;
    if target_seat == seat {
        return Err(SessionError::domain("Invalid target"));
    }
    let own = state
        .players
        .get_mut(seat)
        .map(|p| std::mem::take(&mut p.hand))
        .ok_or_else(|| SessionError::fault("acting seat out of range"))?;
    let theirs = state
        .players
        .get_mut(target_seat)
        .map(|p| std::mem::replace(&mut p.hand, own))
        .ok_or_else(|| SessionError::fault("target seat out of range"))?;
    if let Some(player) = state.players.get_mut(seat) {
        player.hand = theirs;
    }
    Ok(())
}

/// King: take the crown (flag and counter) and collect per-yellow income.
fn resolve_king(state: &mut GameState, seat: usize) -> Result<()> {
    for player in &mut state.players {
        player.has_crown = false;
    }
    let king = state
        .players
        .get_mut(seat)
        .ok_or_else(|| SessionError::fault("acting seat out of range"))?;
    let income = king.built_of_color(Color::Yellow);
    king.gold += income;
    king.has_crown = true;
    state.crown.value = seat;
    Ok(())
}

/// Flat income plus 1 gold per built district of the character's color.
fn collect_income(state: &mut GameState, seat: usize, color: Color, base: u32) -> Result<()> {
    let player = state
        .players
        .get_mut(seat)
        .ok_or_else(|| SessionError::fault("acting seat out of range"))?;
    let income = base + player.built_of_color(color);
    player.gold += income;
    Ok(())
}

/// Architect: draw up to 2 districts from the deck.
fn resolve_architect(state: &mut GameState, seat: usize) -> Result<()> {
    let n = 2.min(state.district_deck.len());
    let drawn = state
        .draw_districts(n)
        .ok_or_else(|| SessionError::fault("deck shrank during architect draw"))?;
    if let Some(player) = state.players.get_mut(seat) {
        player.hand.extend(drawn);
    }
    Ok(())
}

/// Warlord: collect per-red income; choice 0 stops there, a positive choice
/// razes the opponent's district at index `choice - 1` for its cost − 1.
fn resolve_warlord(state: &mut GameState, seat: usize, choice: i64) -> Result<()> {
    let income = state
        .players
        .get(seat)
        .map(|p| p.built_of_color(Color::Red))
        .ok_or_else(|| SessionError::fault("acting seat out of range"))?;
    if choice == 0 {
        if let Some(player) = state.players.get_mut(seat) {
            player.gold += income;
        }
        return Ok(());
    }

    let index = usize::try_from(choice - 1).map_err(|_| SessionError::domain("Invalid choice"))?;
    let others: Vec<usize> = (0..state.players.len()).filter(|s| *s != seat).collect();
    let &[target_seat] = others.as_slice() else {
        return Err(SessionError::domain("Razing needs exactly one opponent"));
    };
    let target = state
        .players
        .get(target_seat)
        .ok_or_else(|| SessionError::fault("target seat out of range"))?;
    if target.districts.len() >= COMPLETION_THRESHOLD {
        return Err(SessionError::domain("Can't raze a completed city"));
    }
    let card_id = target
        .districts
        .get(index)
        .copied()
        .ok_or_else(|| SessionError::domain("Invalid choice"))?;
    let card =
        district(card_id).ok_or_else(|| SessionError::fault("built set holds an unknown id"))?;
    let price = card.cost.saturating_sub(1);
    let gold = state
        .players
        .get(seat)
        .map(|p| p.gold)
        .ok_or_else(|| SessionError::fault("acting seat out of range"))?;
    if gold + income < price {
        return Err(SessionError::domain("You can't afford to raze that district"));
    }

    if let Some(target) = state.players.get_mut(target_seat) {
        target.districts.swap_remove(index);
    }
    if let Some(player) = state.players.get_mut(seat) {
        player.gold = player.gold + income - price;
    }
    Ok(())
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
    use crate::protocol::{CommandKind, PlayerUuid};
    use serde_json::json;
    use uuid::Uuid;

    /// A 2-player state parked in the special phase with the given role
    /// slots; `turn` sits on the first slot, owned by player A.
    fn special_at(slot_a: usize, slot_b: usize) -> (GameState, PlayerUuid, PlayerUuid) {
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
        let (first, second) = (state.players[0].uuid, state.players[1].uuid);
        let (first_id, second_id) = (state.players[0].id, state.players[1].id);
        state.roles = [None; CHARACTER_COUNT];
        state.roles[slot_a] = Some(first_id);
        state.roles[slot_b] = Some(second_id);
        state.character_deck.clear();
        state.turn = slot_a.min(slot_b);
        state.phase = Phase::Special;
        (state, first, second)
    }

    fn powers(state: &mut GameState, uuid: PlayerUuid, choice: i64) -> Result<bool> {
        state.dispatch(&Command::new(CommandKind::Powers, uuid, 0).with_data(json!(choice)))
    }

    fn id_of(name: &str) -> usize {
        DISTRICTS.iter().position(|d| d.name == name).unwrap()
    }

    #[test]
    fn accepted_ability_advances_to_next_occupied_slot() {
        let (mut state, a, _) = special_at(0, 4);
        powers(&mut state, a, -1).unwrap();
        assert_eq!(state.turn, 4);
        assert_eq!(state.phase, Phase::GoldOrDraw);
    }

    #[test]
    fn powers_respect_phase_and_turn() {
        let (mut state, a, b) = special_at(0, 4);
        let err = powers(&mut state, b, -1).unwrap_err();
        assert!(matches!(err, SessionError::TurnViolation));

        state.phase = Phase::Build;
        let err = powers(&mut state, a, -1).unwrap_err();
        assert!(matches!(err, SessionError::IllegalPhase(_)));
    }

    #[test]
    fn assassin_skips_the_killed_slot() {
        let (mut state, a, _) = special_at(0, 4);
        // Kill slot 4; player A's assassin turn ends the round immediately
        // because no other occupied slot remains.
        powers(&mut state, a, 4).unwrap();
        assert_eq!(state.kill, None, "kill marker resets with the new round");
        assert_eq!(state.phase, Phase::Draft);
    }

    #[test]
    fn assassin_rejects_bad_targets() {
        let (mut state, a, _) = special_at(0, 4);
        for bad in [0, 8, 99] {
            let err = powers(&mut state, a, bad).unwrap_err();
            assert!(matches!(err, SessionError::DomainViolation(_)));
            assert_eq!(state.phase, Phase::Special);
            assert_eq!(state.turn, 0);
        }
    }

    #[test]
    fn thief_takes_the_victims_gold() {
        let (mut state, a, _) = special_at(1, 6);
        state.players[0].gold = 2;
        state.players[1].gold = 7;
        powers(&mut state, a, 6).unwrap();
        assert_eq!(state.players[0].gold, 9);
        assert_eq!(state.players[1].gold, 0);
        assert_eq!(state.turn, 6);
    }

    #[test]
    fn thief_fizzles_on_unassigned_slot() {
        let (mut state, a, _) = special_at(1, 6);
        state.players[1].gold = 7;
        powers(&mut state, a, 5).unwrap();
        assert_eq!(state.players[1].gold, 7);
    }

    #[test]
    fn thief_cannot_rob_the_assassinated_slot() {
        let (mut state, a, _) = special_at(1, 6);
        state.kill = Some(6);
        let err = powers(&mut state, a, 6).unwrap_err();
        assert!(matches!(err, SessionError::DomainViolation(_)));
    }

    #[test]
    fn magician_redraw_replaces_the_hand() {
        let (mut state, a, _) = special_at(2, 5);
        let before = state.players[0].hand.clone();
        let deck_before = state.district_deck.len();
        powers(&mut state, a, 0).unwrap();
        let after = &state.players[0].hand;
        assert_eq!(after.len(), before.len());
        assert!(before.iter().all(|id| !after.contains(id)));
        assert_eq!(state.district_deck.len(), deck_before - before.len());
    }

    #[test]
    fn magician_swaps_hands_by_player_id() {
        let (mut state, a, _) = special_at(2, 5);
        let target = state.players[1].id;
        let (hand_a, hand_b) = (
            state.players[0].hand.clone(),
            state.players[1].hand.clone(),
        );
        powers(&mut state, a, i64::from(target)).unwrap();
        assert_eq!(state.players[0].hand, hand_b);
        assert_eq!(state.players[1].hand, hand_a);
    }

    #[test]
    fn magician_rejects_self_swap() {
        let (mut state, a, _) = special_at(2, 5);
        let own = state.players[0].id;
        let err = powers(&mut state, a, i64::from(own)).unwrap_err();
        assert!(matches!(err, SessionError::DomainViolation(_)));
    }

    #[test]
    fn king_takes_crown_and_yellow_income() {
        let (mut state, a, _) = special_at(3, 6);
        state.players[0].districts = vec![id_of("Manor"), id_of("Castle"), id_of("Temple")];
        state.players[1].has_crown = true;
        state.players[0].has_crown = false;
        let gold = state.players[0].gold;

        powers(&mut state, a, 0).unwrap();
        assert_eq!(state.players[0].gold, gold + 2);
        assert!(state.players[0].has_crown);
        assert!(!state.players[1].has_crown);
        assert_eq!(state.crown.value, 0);
    }

    #[test]
    fn bishop_and_merchant_income() {
        let (mut state, a, _) = special_at(4, 7);
        state.players[0].districts = vec![id_of("Temple"), id_of("Church"), id_of("Tavern")];
        let gold = state.players[0].gold;
        powers(&mut state, a, 0).unwrap();
        assert_eq!(state.players[0].gold, gold + 2, "bishop: 2 blue districts");

        let (mut state, a, _) = special_at(5, 7);
        state.players[0].districts = vec![id_of("Tavern"), id_of("Market")];
        let gold = state.players[0].gold;
        powers(&mut state, a, 0).unwrap();
        assert_eq!(state.players[0].gold, gold + 3, "merchant: 1 flat + 2 green");
    }

    #[test]
    fn architect_draws_two() {
        let (mut state, a, _) = special_at(6, 7);
        let hand = state.players[0].hand.len();
        let deck = state.district_deck.len();
        powers(&mut state, a, 0).unwrap();
        assert_eq!(state.players[0].hand.len(), hand + 2);
        assert_eq!(state.district_deck.len(), deck - 2);
    }

    #[test]
    fn warlord_razes_for_cost_minus_one() {
        let (mut state, warlord, king) = special_at(7, 3);
        // Slot 3 acts first; decline the king's ability to reach the warlord.
        powers(&mut state, king, -1).unwrap();
        assert_eq!(state.turn, 7);

        state.players[1].districts = vec![id_of("Castle")];
        state.players[0].districts = vec![id_of("Watchtower")];
        state.players[0].gold = 3;
        powers(&mut state, warlord, 1).unwrap();
        assert!(state.players[1].districts.is_empty());
        // 3 gold + 1 red income − (4 − 1) raze price.
        assert_eq!(state.players[0].gold, 1);
    }

    #[test]
    fn warlord_cannot_raze_a_completed_city() {
        let (mut state, warlord, king) = special_at(7, 3);
        powers(&mut state, king, -1).unwrap();
        state.players[1].districts = (0..8).map(|_| id_of("Temple")).collect();
        state.players[0].gold = 20;
        let err = powers(&mut state, warlord, 1).unwrap_err();
        assert!(matches!(err, SessionError::DomainViolation(_)));
    }

    #[test]
    fn round_end_scores_and_redeals() {
        let (mut state, a, _) = special_at(0, 4);
        state.players[0].districts = vec![id_of("Manor"), id_of("Temple")];
        state.players[1].districts = vec![
            id_of("Manor"),
            id_of("Temple"),
            id_of("Tavern"),
            id_of("Watchtower"),
            id_of("Keep"),
        ];
        let bishop = state.players[1].uuid;

        powers(&mut state, a, -1).unwrap();
        assert_eq!(state.turn, 4);
        powers(&mut state, bishop, -1).unwrap();

        // Round over: scores computed, new draft dealt, crown advanced.
        assert_eq!(state.players[0].score, 3 + 1);
        // 3+1+1+1+3 built, +3 for holding all five colors.
        assert_eq!(state.players[1].score, 9 + 3);
        assert_eq!(state.phase, Phase::Draft);
        assert_eq!(state.character_deck.len(), 7);
        assert!(state.roles.iter().all(|r| r.is_none()));
        assert_eq!(state.turn, 0, "crown counter led round one from seat 0");
        assert_eq!(state.crown.value, 1);
    }

    #[test]
    fn completed_city_ends_the_game() {
        let (mut state, a, _) = special_at(0, 4);
        let eight: Vec<usize> = [
            "Manor", "Castle", "Temple", "Tavern", "Market", "Watchtower", "Prison", "Keep",
        ]
        .iter()
        .map(|n| id_of(n))
        .collect();
        state.players[1].districts = eight;
        state.first_to_eight = Some(state.players[1].id);
        let bishop = state.players[1].uuid;

        powers(&mut state, a, -1).unwrap();
        powers(&mut state, bishop, -1).unwrap();

        assert_eq!(state.phase, Phase::End);
        // Σ costs 3+4+1+1+2+1+2+3 = 17, +3 all colors, +4 first to eight.
        assert_eq!(state.players[1].score, 17 + 3 + 4);

        // Terminal: nothing advances the phase any more.
        let err = powers(&mut state, bishop, -1).unwrap_err();
        assert!(matches!(err, SessionError::IllegalPhase(_)));
        assert_eq!(state.phase, Phase::End);
    }
}
