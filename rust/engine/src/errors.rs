use crate::cards::{Card, Suit};
use thiserror::Error;

/// Every way a session operation can be refused.
///
/// All variants are recoverable: the session is left exactly as it was
/// before the call. [`GameError::CorruptRound`] and [`GameError::InvalidDeck`]
/// signal a programming defect rather than a rule violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Game already started")]
    GameAlreadyStarted,
    #[error("Name {0} is already taken")]
    NameTaken(String),
    #[error("Game is full (max {max} players)")]
    LobbyFull { max: usize },
    #[error("Need at least {minimum} players (have {actual})")]
    NotEnoughPlayers { minimum: usize, actual: usize },
    #[error("Unknown player: {0}")]
    UnknownPlayer(String),
    #[error("Only the host can do that")]
    NotHost,
    #[error("Game not in progress")]
    NotInProgress,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("You are not an active player")]
    NotActive,
    #[error("Card not in your hand: {0}")]
    CardNotInHand(Card),
    #[error("First card must be Ace of Spades")]
    FirstCardMustBeAceOfSpades,
    #[error("You must play a {0}")]
    MustFollowSuit(Suit),
    #[error("Cannot take hand during a round")]
    RoundInProgress,
    #[error("You can only take hand on your turn")]
    TakeHandNotYourTurn,
    #[error("No player to take from")]
    NoLeftNeighbor,
    #[error("{0} has no cards")]
    NeighborHasNoCards(String),
    #[error("Game not started - use normal join")]
    RejoinBeforeStart,
    #[error("Game is finished")]
    GameFinished,
    #[error("You were not part of this game")]
    NotOriginalPlayer,
    #[error("Player with this name is already connected")]
    AlreadyConnected,
    #[error("Game is not finished")]
    NotFinished,
    #[error("Round state is corrupt: {0}")]
    CorruptRound(&'static str),
    #[error("Invalid deck: {0}")]
    InvalidDeck(String),
}

impl GameError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::GameAlreadyStarted => "game_already_started",
            GameError::NameTaken(_) => "name_taken",
            GameError::LobbyFull { .. } => "lobby_full",
            GameError::NotEnoughPlayers { .. } => "not_enough_players",
            GameError::UnknownPlayer(_) => "unknown_player",
            GameError::NotHost => "not_host",
            GameError::NotInProgress => "game_not_in_progress",
            GameError::NotYourTurn | GameError::TakeHandNotYourTurn => "not_your_turn",
            GameError::NotActive => "not_active_player",
            GameError::CardNotInHand(_) => "card_not_in_hand",
            GameError::FirstCardMustBeAceOfSpades => "first_card_must_be_ace_of_spades",
            GameError::MustFollowSuit(_) => "must_follow_suit",
            GameError::RoundInProgress => "round_in_progress",
            GameError::NoLeftNeighbor => "no_left_neighbor",
            GameError::NeighborHasNoCards(_) => "neighbor_has_no_cards",
            GameError::RejoinBeforeStart => "game_not_started",
            GameError::GameFinished => "game_finished",
            GameError::NotOriginalPlayer => "not_original_player",
            GameError::AlreadyConnected => "already_connected",
            GameError::NotFinished => "game_not_finished",
            GameError::CorruptRound(_) => "corrupt_round",
            GameError::InvalidDeck(_) => "invalid_deck",
        }
    }

    /// True when the error means the engine itself is broken.
    pub fn is_defect(&self) -> bool {
        matches!(self, GameError::CorruptRound(_) | GameError::InvalidDeck(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Rank;

    #[test]
    fn messages_match_client_wording() {
        assert_eq!(GameError::NotYourTurn.to_string(), "Not your turn");
        assert_eq!(
            GameError::MustFollowSuit(Suit::Hearts).to_string(),
            "You must play a HEARTS"
        );
        assert_eq!(
            GameError::CardNotInHand(Card::new(Suit::Clubs, Rank::Two)).to_string(),
            "Card not in your hand: 2 of CLUBS"
        );
    }

    #[test]
    fn only_internal_failures_are_defects() {
        assert!(GameError::CorruptRound("empty pile").is_defect());
        assert!(!GameError::NotYourTurn.is_defect());
        assert!(!GameError::NotHost.is_defect());
    }
}
