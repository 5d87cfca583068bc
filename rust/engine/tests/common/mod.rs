#![allow(dead_code)]

use kazhutha_engine::cards::{full_deck, Card, Rank, Suit};
use kazhutha_engine::deck::Deck;
use kazhutha_engine::game::GameSession;

pub fn card(suit: Suit, rank: Rank) -> Card {
    Card::new(suit, rank)
}

/// Builds a deck that deals `fixed[i]` to seat `i`, topping every seat up
/// from the remaining cards (clubs first, then diamonds, hearts, spades).
pub fn stacked_deck(fixed: &[Vec<Card>]) -> Deck {
    let seats = fixed.len();
    let mut pool: Vec<Card> = full_deck()
        .into_iter()
        .filter(|c| !fixed.iter().any(|hand| hand.contains(c)))
        .collect();
    pool.reverse();

    let hands: Vec<Vec<Card>> = fixed
        .iter()
        .enumerate()
        .map(|(seat, cards)| {
            let size = 52 / seats + usize::from(seat < 52 % seats);
            let mut hand = cards.clone();
            while hand.len() < size {
                hand.push(pool.pop().expect("enough cards to fill seat"));
            }
            hand
        })
        .collect();

    let mut order = Vec::with_capacity(52);
    for i in 0..hands[0].len() {
        for hand in &hands {
            if let Some(c) = hand.get(i) {
                order.push(*c);
            }
        }
    }
    Deck::stacked(order).expect("stacked deck is a full deck")
}

pub fn lobby(players: &[&str]) -> GameSession {
    let mut game = GameSession::new("TABLE1", players[0]);
    for p in &players[1..] {
        game.add_player(p).expect("join lobby");
    }
    game
}

pub fn started_with(players: &[&str], fixed: &[Vec<Card>]) -> GameSession {
    let mut game = lobby(players);
    game.start_game_with_deck(stacked_deck(fixed))
        .expect("start game");
    game
}

pub fn all_spades() -> Vec<Card> {
    kazhutha_engine::cards::all_ranks()
        .into_iter()
        .map(|r| card(Suit::Spades, r))
        .collect()
}
