use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::HashSet;

use crate::cards::{full_deck, Card};
use crate::errors::GameError;

/// A full 52-card deck in dealing order.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
    position: usize,
}

impl Deck {
    /// Uniformly shuffled deck; the same seed always gives the same order.
    pub fn new_with_seed(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut cards = full_deck();
        cards.shuffle(&mut rng);
        Self { cards, position: 0 }
    }

    pub fn new_random() -> Self {
        Self::new_with_seed(rand::rng().random())
    }

    /// Deck in a caller-chosen order. The cards must be exactly one full deck.
    pub fn stacked(cards: Vec<Card>) -> Result<Self, GameError> {
        if cards.len() != 52 {
            return Err(GameError::InvalidDeck(format!(
                "expected 52 cards, got {}",
                cards.len()
            )));
        }
        let mut seen = HashSet::with_capacity(52);
        for card in &cards {
            if !seen.insert(*card) {
                return Err(GameError::InvalidDeck(format!("duplicate card {card}")));
            }
        }
        Ok(Self { cards, position: 0 })
    }

    pub fn deal_card(&mut self) -> Option<Card> {
        let card = self.cards.get(self.position).copied()?;
        self.position += 1;
        Some(card)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.position)
    }

    /// Deals every remaining card round-robin: card `i` goes to seat `i % seats`.
    /// Hand sizes differ by at most one.
    pub fn deal_round_robin(&mut self, seats: usize) -> Vec<Vec<Card>> {
        let mut hands = vec![Vec::new(); seats];
        if seats == 0 {
            return hands;
        }
        let mut seat = 0;
        while let Some(card) = self.deal_card() {
            hands[seat].push(card);
            seat = (seat + 1) % seats;
        }
        hands
    }
}
