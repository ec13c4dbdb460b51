//! Static game content: character archetypes and the district card set.
//!
//! Decks are sequences of indexes. Character ids index [`Character::ALL`]
//! (rank order); district ids index [`DISTRICTS`]. Duplicate physical cards
//! are separate table entries sharing a name.

use serde::Serialize;

/// Number of character archetypes; also the size of the role-slot table.
pub const CHARACTER_COUNT: usize = 8;

/// The character archetypes, in rank order.
///
/// Rank order is load-bearing: role slots are indexed by rank, and the turn
/// sequence after the draft walks occupied slots in ascending rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Character {
    Assassin,
    Thief,
    Magician,
    King,
    Bishop,
    Merchant,
    Architect,
    Warlord,
}

impl Character {
    /// All archetypes in rank order.
    pub const ALL: [Character; CHARACTER_COUNT] = [
        Character::Assassin,
        Character::Thief,
        Character::Magician,
        Character::King,
        Character::Bishop,
        Character::Merchant,
        Character::Architect,
        Character::Warlord,
    ];

    /// The archetype at the given rank, if in range.
    pub fn from_rank(rank: usize) -> Option<Character> {
        Character::ALL.get(rank).copied()
    }

    /// This archetype's rank (its role-slot index).
    pub fn rank(self) -> usize {
        self as usize
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Character::Assassin => "Assassin",
            Character::Thief => "Thief",
            Character::Magician => "Magician",
            Character::King => "King",
            Character::Bishop => "Bishop",
            Character::Merchant => "Merchant",
            Character::Architect => "Architect",
            Character::Warlord => "Warlord",
        }
    }
}

/// District card colors. All five must appear in a built set for the
/// end-of-round color bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Yellow,
    Blue,
    Green,
    Red,
    Purple,
}

/// Number of district colors.
pub const COLOR_COUNT: usize = 5;

/// One district card. `cost` is both the build price and the end-of-round
/// scoring value.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct District {
    pub name: &'static str,
    pub color: Color,
    pub cost: u32,
}

const fn d(name: &'static str, color: Color, cost: u32) -> District {
    District { name, color, cost }
}

/// The full district deck. Index into this table is the district id carried
/// in decks, hands, and built sets.
pub const DISTRICTS: &[District] = &[
    // Yellow
    d("Manor", Color::Yellow, 3),
    d("Manor", Color::Yellow, 3),
    d("Manor", Color::Yellow, 3),
    d("Manor", Color::Yellow, 3),
    d("Manor", Color::Yellow, 3),
    d("Castle", Color::Yellow, 4),
    d("Castle", Color::Yellow, 4),
    d("Castle", Color::Yellow, 4),
    d("Castle", Color::Yellow, 4),
    d("Palace", Color::Yellow, 5),
    d("Palace", Color::Yellow, 5),
    d("Palace", Color::Yellow, 5),
    // Blue
    d("Temple", Color::Blue, 1),
    d("Temple", Color::Blue, 1),
    d("Temple", Color::Blue, 1),
    d("Church", Color::Blue, 2),
    d("Church", Color::Blue, 2),
    d("Church", Color::Blue, 2),
    d("Monastery", Color::Blue, 3),
    d("Monastery", Color::Blue, 3),
    d("Monastery", Color::Blue, 3),
    d("Cathedral", Color::Blue, 5),
    d("Cathedral", Color::Blue, 5),
    // Green
    d("Tavern", Color::Green, 1),
    d("Tavern", Color::Green, 1),
    d("Tavern", Color::Green, 1),
    d("Tavern", Color::Green, 1),
    d("Tavern", Color::Green, 1),
    d("Market", Color::Green, 2),
    d("Market", Color::Green, 2),
    d("Market", Color::Green, 2),
    d("Market", Color::Green, 2),
    d("Trading Post", Color::Green, 2),
    d("Trading Post", Color::Green, 2),
    d("Trading Post", Color::Green, 2),
    d("Docks", Color::Green, 3),
    d("Docks", Color::Green, 3),
    d("Docks", Color::Green, 3),
    d("Harbor", Color::Green, 4),
    d("Harbor", Color::Green, 4),
    d("Harbor", Color::Green, 4),
    d("Town Hall", Color::Green, 5),
    d("Town Hall", Color::Green, 5),
    // Red
    d("Watchtower", Color::Red, 1),
    d("Watchtower", Color::Red, 1),
    d("Watchtower", Color::Red, 1),
    d("Prison", Color::Red, 2),
    d("Prison", Color::Red, 2),
    d("Prison", Color::Red, 2),
    d("Barracks", Color::Red, 3),
    d("Barracks", Color::Red, 3),
    d("Barracks", Color::Red, 3),
    d("Fortress", Color::Red, 5),
    d("Fortress", Color::Red, 5),
    // Purple
    d("Haunted Quarter", Color::Purple, 2),
    d("Keep", Color::Purple, 3),
    d("Keep", Color::Purple, 3),
    d("Laboratory", Color::Purple, 5),
    d("Smithy", Color::Purple, 5),
    d("Observatory", Color::Purple, 5),
    d("Graveyard", Color::Purple, 5),
    d("Imperial Treasury", Color::Purple, 5),
    d("Dragon Gate", Color::Purple, 6),
    d("University", Color::Purple, 6),
    d("Library", Color::Purple, 6),
    d("Great Wall", Color::Purple, 6),
    d("School of Magic", Color::Purple, 6),
];

/// Look up a district by id.
pub fn district(id: usize) -> Option<&'static District> {
    DISTRICTS.get(id)
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

    #[test]
    fn ranks_round_trip() {
        for (i, ch) in Character::ALL.iter().enumerate() {
            assert_eq!(ch.rank(), i);
            assert_eq!(Character::from_rank(i), Some(*ch));
        }
        assert_eq!(Character::from_rank(CHARACTER_COUNT), None);
    }

    #[test]
    fn deck_is_big_enough_for_a_full_table() {
        // 7 seats at 4 cards each must deal from a fresh deck.
        assert!(DISTRICTS.len() >= 7 * 4);
    }

    #[test]
    fn every_color_is_represented() {
        for color in [
            Color::Yellow,
            Color::Blue,
            Color::Green,
            Color::Red,
            Color::Purple,
        ] {
            assert!(DISTRICTS.iter().any(|d| d.color == color));
        }
    }

    #[test]
    fn duplicate_cards_share_name_and_cost() {
        for card in DISTRICTS {
            for other in DISTRICTS.iter().filter(|o| o.name == card.name) {
                assert_eq!(card.cost, other.cost, "{}", card.name);
                assert_eq!(card.color, other.color, "{}", card.name);
            }
        }
    }
}
