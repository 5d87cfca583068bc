use crate::cards::{Card, Suit};
use serde::{Deserialize, Serialize};

/// Maximum number of players a lobby accepts.
pub const MAX_PLAYERS: usize = 8;

/// Minimum number of players needed to start.
pub const MIN_PLAYERS: usize = 2;

/// Where a seated player stands once a game has started.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    /// Holding cards with a live connection
    ConnectedActive,
    /// Holding cards but the connection dropped; their turn stalls
    DisconnectedActive,
    /// Emptied their hand (or had it taken)
    Won,
    /// Left the game for good; cards are kept but they never came back
    NeverReconnected,
}

/// A player's cards, kept in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cards(mut cards: Vec<Card>) -> Self {
        cards.sort();
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn contains(&self, card: &Card) -> bool {
        self.cards.contains(card)
    }

    pub fn has_suit(&self, suit: Suit) -> bool {
        self.cards.iter().any(|c| c.suit == suit)
    }

    /// Removes one card; returns false if it was not held.
    pub fn remove(&mut self, card: &Card) -> bool {
        match self.cards.iter().position(|c| c == card) {
            Some(idx) => {
                self.cards.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Adds cards and restores display order.
    pub fn extend<I: IntoIterator<Item = Card>>(&mut self, cards: I) {
        self.cards.extend(cards);
        self.cards.sort();
    }

    /// Empties the hand, returning what it held.
    pub fn take_all(&mut self) -> Vec<Card> {
        std::mem::take(&mut self.cards)
    }

    pub fn clear(&mut self) {
        self.cards.clear();
    }
}
