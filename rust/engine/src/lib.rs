//! # kazhutha-engine: Kazhutha Card Game Core
//!
//! Rules and session state for Kazhutha, a shedding/trick-taking game for
//! 2 to 8 players. The last player left holding cards is the *kazhutha*
//! (the donkey). This crate performs no I/O: a request layer drives one
//! [`game::GameSession`] per table and reads state back through snapshots.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Suit, Rank, Card) and hand ordering
//! - [`deck`] - Seeded and random shuffles, round-robin dealing
//! - [`player`] - Hands and per-player status
//! - [`rules`] - Play legality and round winner selection
//! - [`game`] - The session state machine: lobby, turns, rounds, take-hand, reconnects
//! - [`snapshot`] - Serializable per-player views of a session
//! - [`errors`] - Error types for rejected operations
//!
//! ## Quick Start
//!
//! ```rust
//! use kazhutha_engine::cards::ACE_OF_SPADES;
//! use kazhutha_engine::deck::Deck;
//! use kazhutha_engine::game::{GameSession, PlayOutcome};
//!
//! let mut game = GameSession::new("K4ZH01", "alice");
//! game.add_player("bob").unwrap();
//! game.start_game_with_deck(Deck::new_with_seed(42)).unwrap();
//!
//! // Whoever was dealt the Ace of Spades opens the game with it
//! let leader = game.current_player().unwrap().to_string();
//! assert!(game.hand(&leader).unwrap().contains(&ACE_OF_SPADES));
//!
//! let outcome = game.play_card(&leader, ACE_OF_SPADES).unwrap();
//! assert!(matches!(outcome, PlayOutcome::Continued { .. }));
//! ```
//!
//! ## Rule Violations
//!
//! Every refused operation returns a [`errors::GameError`] and leaves the
//! session untouched:
//!
//! ```rust
//! use kazhutha_engine::cards::{Card, Rank, Suit};
//! use kazhutha_engine::deck::Deck;
//! use kazhutha_engine::errors::GameError;
//! use kazhutha_engine::game::GameSession;
//!
//! let mut game = GameSession::new("K4ZH02", "alice");
//! game.add_player("bob").unwrap();
//! game.start_game_with_deck(Deck::new_with_seed(7)).unwrap();
//!
//! let leader = game.current_player().unwrap().to_string();
//! let not_the_ace = *game
//!     .hand(&leader)
//!     .unwrap()
//!     .iter()
//!     .find(|c| **c != Card::new(Suit::Spades, Rank::Ace))
//!     .unwrap();
//!
//! assert_eq!(
//!     game.play_card(&leader, not_the_ace),
//!     Err(GameError::FirstCardMustBeAceOfSpades)
//! );
//! ```

pub mod cards;
pub mod deck;
pub mod errors;
pub mod game;
pub mod player;
pub mod rules;
pub mod snapshot;
