use crate::cards::{Card, Suit, ACE_OF_SPADES};
use crate::errors::GameError;
use crate::game::Play;
use crate::player::Hand;

/// Checks whether `card` may be played from `hand`.
///
/// Covers the card-level rules only: ownership, the opening Ace of Spades,
/// and following the round suit. Turn order is the session's concern.
///
/// # Arguments
///
/// * `hand` - The acting player's current hand
/// * `card` - The card they want to play
/// * `round_suit` - Suit that opened the running round, `None` if this card opens one
/// * `first_card_played` - Whether any card has been played yet this game
///
/// # Errors
///
/// - [`GameError::CardNotInHand`] - The card is not held
/// - [`GameError::FirstCardMustBeAceOfSpades`] - The game's first play is anything else
/// - [`GameError::MustFollowSuit`] - The player holds the round suit but played another
///
/// # Examples
///
/// ```
/// use kazhutha_engine::cards::{Card, Rank, Suit};
/// use kazhutha_engine::errors::GameError;
/// use kazhutha_engine::player::Hand;
/// use kazhutha_engine::rules::validate_play;
///
/// let hand = Hand::from_cards(vec![
///     Card::new(Suit::Hearts, Rank::Four),
///     Card::new(Suit::Clubs, Rank::King),
/// ]);
///
/// // Holding a heart, so a club cannot be played into a hearts round
/// let result = validate_play(&hand, Card::new(Suit::Clubs, Rank::King), Some(Suit::Hearts), true);
/// assert_eq!(result, Err(GameError::MustFollowSuit(Suit::Hearts)));
///
/// // No spades held, so anything goes into a spades round
/// assert!(validate_play(&hand, Card::new(Suit::Clubs, Rank::King), Some(Suit::Spades), true).is_ok());
/// ```
pub fn validate_play(
    hand: &Hand,
    card: Card,
    round_suit: Option<Suit>,
    first_card_played: bool,
) -> Result<(), GameError> {
    if !hand.contains(&card) {
        return Err(GameError::CardNotInHand(card));
    }
    if !first_card_played && card != ACE_OF_SPADES {
        return Err(GameError::FirstCardMustBeAceOfSpades);
    }
    if let Some(suit) = round_suit {
        if card.suit != suit && hand.has_suit(suit) {
            return Err(GameError::MustFollowSuit(suit));
        }
    }
    Ok(())
}

/// The player who played the highest card of the opening suit.
pub fn round_winner(pile: &[Play], opening_suit: Suit) -> Result<&str, GameError> {
    if pile.is_empty() {
        return Err(GameError::CorruptRound("resolving an empty pile"));
    }
    pile.iter()
        .filter(|play| play.card.suit == opening_suit)
        .max_by_key(|play| play.card.value())
        .map(|play| play.player.as_str())
        .ok_or(GameError::CorruptRound("no card of the opening suit"))
}
