mod common;

use std::collections::HashSet;

use common::{card, lobby, stacked_deck};
use kazhutha_engine::cards::{Rank, Suit, ACE_OF_SPADES};
use kazhutha_engine::deck::Deck;
use kazhutha_engine::errors::GameError;
use kazhutha_engine::game::Phase;

const NAMES: [&str; 8] = ["ana", "ben", "cy", "dee", "eli", "fay", "gus", "hal"];

#[test]
fn every_card_is_dealt_exactly_once() {
    for players in 2..=8 {
        for seed in [1_u64, 17, 99] {
            let mut game = lobby(&NAMES[..players]);
            game.start_game_with_deck(Deck::new_with_seed(seed))
                .expect("start");

            let mut seen = HashSet::new();
            for name in game.seating() {
                for c in game.hand(name).expect("seated") {
                    assert!(seen.insert(*c), "{c} dealt twice");
                }
            }
            assert_eq!(seen.len(), 52);
        }
    }
}

#[test]
fn hand_sizes_differ_by_at_most_one_in_seating_order() {
    let mut game = lobby(&NAMES[..5]);
    game.start_game_with_deck(Deck::new_with_seed(3))
        .expect("start");

    let sizes: Vec<usize> = game.seating().iter().map(|p| game.card_count(p)).collect();
    assert_eq!(sizes, vec![11, 11, 10, 10, 10]);
}

#[test]
fn ace_of_spades_holder_leads() {
    for seed in 0..20_u64 {
        let mut game = lobby(&NAMES[..4]);
        game.start_game_with_deck(Deck::new_with_seed(seed))
            .expect("start");

        let leader = game.current_player().expect("leader");
        assert!(game.hand(leader).expect("hand").contains(&ACE_OF_SPADES));
        assert_eq!(
            game.last_action(),
            Some(format!("{leader} holds the ACE of SPADES and leads").as_str())
        );
    }
}

#[test]
fn stacked_deal_puts_the_ace_where_asked() {
    let mut game = lobby(&["a", "b", "c"]);
    game.start_game_with_deck(stacked_deck(&[
        vec![],
        vec![],
        vec![ACE_OF_SPADES],
    ]))
    .expect("start");

    assert_eq!(game.current_player(), Some("c"));
    assert_eq!(game.phase(), Phase::Playing);
    assert_eq!(game.active_players(), game.seating());
    assert_eq!(game.original_players(), game.seating());
    assert!(game.seating().iter().all(|p| game.is_connected(p)));
}

#[test]
fn start_needs_two_players() {
    let mut game = lobby(&["solo"]);
    assert_eq!(
        game.start_game(),
        Err(GameError::NotEnoughPlayers {
            minimum: 2,
            actual: 1
        })
    );
    assert_eq!(game.phase(), Phase::Waiting);
    assert!(game.hand("solo").expect("seated").is_empty());
}

#[test]
fn partially_dealt_deck_is_refused() {
    let mut deck = Deck::new_with_seed(5);
    deck.deal_card();

    let mut game = lobby(&["a", "b"]);
    assert!(matches!(
        game.start_game_with_deck(deck),
        Err(GameError::InvalidDeck(_))
    ));
    assert!(!game.is_started());
}

#[test]
fn dealt_hands_are_sorted_for_display() {
    let mut game = lobby(&["a", "b"]);
    game.start_game_with_deck(stacked_deck(&[
        vec![card(Suit::Spades, Rank::Two), ACE_OF_SPADES],
        vec![],
    ]))
    .expect("start");

    let hand = game.hand("a").expect("hand");
    let mut sorted = hand.to_vec();
    sorted.sort();
    assert_eq!(hand, sorted.as_slice());
}
