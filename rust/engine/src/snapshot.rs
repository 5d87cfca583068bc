use serde::{Deserialize, Serialize};

use crate::cards::{Card, Suit};
use crate::game::{GameId, GameSession, Phase, Play};
use crate::player::PlayerStatus;

/// Public view of one seated player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerView {
    pub name: String,
    pub card_count: usize,
    pub is_host: bool,
    pub is_active: bool,
    pub is_winner: bool,
    pub is_kazhutha: bool,
    pub is_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PlayerStatus>,
}

/// Everything a client may know about a session.
///
/// Built fresh for each recipient: `your_hand` is only present when the
/// view was requested for a seated player, and only holds that player's cards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStateView {
    pub game_id: GameId,
    pub players: Vec<PlayerView>,
    pub player_order: Vec<String>,
    pub active_players: Vec<String>,
    pub current_player: Option<String>,
    pub current_suit: Option<Suit>,
    pub current_pile: Vec<Play>,
    pub game_state: Phase,
    pub kazhutha: Option<String>,
    pub winners: Vec<String>,
    pub last_action: Option<String>,
    pub can_take_from_left: Option<String>,
    pub round_in_progress: bool,
    pub discarded_count: usize,
    pub resolved_pile: Vec<Play>,
    pub resolved_winner: Option<String>,
    pub suit_was_broken: bool,
    pub taken_hand_cards: Vec<Card>,
    pub taken_hand_from: Option<String>,
    pub taken_hand_by: Option<String>,
    pub waiting_for_player: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub your_hand: Option<Vec<Card>>,
}

impl GameSession {
    /// Snapshot of the session as seen by `for_player` (or by nobody in particular).
    pub fn state(&self, for_player: Option<&str>) -> GameStateView {
        let players = self
            .seating()
            .iter()
            .map(|name| PlayerView {
                name: name.clone(),
                card_count: self.card_count(name),
                is_host: name == self.host(),
                is_active: self.active_players().contains(name),
                is_winner: self.winners().contains(name),
                is_kazhutha: self.kazhutha() == Some(name.as_str()),
                is_connected: self.is_connected(name),
                status: self.player_status(name),
            })
            .collect();

        let last_round = self.last_round();
        let last_take = self.last_take();

        GameStateView {
            game_id: self.id().to_string(),
            players,
            player_order: self.seating().to_vec(),
            active_players: self.active_players().to_vec(),
            current_player: self.current_player().map(str::to_string),
            current_suit: self.round_suit(),
            current_pile: self.pile().to_vec(),
            game_state: self.phase(),
            kazhutha: self.kazhutha().map(str::to_string),
            winners: self.winners().to_vec(),
            last_action: self.last_action().map(str::to_string),
            can_take_from_left: for_player
                .and_then(|p| self.can_take_from_left(p))
                .map(str::to_string),
            round_in_progress: self.round_in_progress(),
            discarded_count: self.discarded_count(),
            resolved_pile: last_round.map(|r| r.pile.clone()).unwrap_or_default(),
            resolved_winner: last_round.map(|r| r.winner.clone()),
            suit_was_broken: last_round.is_some_and(|r| r.suit_broken),
            taken_hand_cards: last_take.map(|t| t.cards.clone()).unwrap_or_default(),
            taken_hand_from: last_take.map(|t| t.from.clone()),
            taken_hand_by: last_take.map(|t| t.by.clone()),
            waiting_for_player: self.waiting_for().map(str::to_string),
            your_hand: for_player.and_then(|p| self.hand(p)).map(<[Card]>::to_vec),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::deck::Deck;
    use crate::game::GameSession;

    #[test]
    fn lobby_snapshot_has_waiting_tag_and_no_turn() {
        let mut game = GameSession::new("ABC123", "host");
        game.add_player("guest").expect("join");

        let json = serde_json::to_value(game.state(None)).expect("serialize");
        assert_eq!(json["game_id"], "ABC123");
        assert_eq!(json["game_state"], "WAITING");
        assert!(json["current_player"].is_null());
        assert!(json.get("your_hand").is_none());
        assert_eq!(json["players"][0]["is_host"], true);
        assert_eq!(json["players"][1]["name"], "guest");
    }

    #[test]
    fn hand_is_only_visible_to_its_owner() {
        let mut game = GameSession::new("ABC123", "host");
        game.add_player("guest").expect("join");
        game.start_game_with_deck(Deck::new_with_seed(2))
            .expect("start");

        let host_view = game.state(Some("host"));
        let guest_view = game.state(Some("guest"));
        assert_eq!(host_view.your_hand.as_deref(), game.hand("host"));
        assert_eq!(guest_view.your_hand.as_deref(), game.hand("guest"));
        assert_ne!(host_view.your_hand, guest_view.your_hand);
        assert_eq!(game.state(Some("stranger")).your_hand, None);
        assert_eq!(host_view.players[0].card_count, 26);
    }

    #[test]
    fn take_hand_hint_only_for_current_player() {
        let mut game = GameSession::new("ABC123", "a");
        game.add_player("b").expect("join");
        game.start_game_with_deck(Deck::new_with_seed(4))
            .expect("start");

        let leader = game.current_player().expect("leader").to_string();
        let other = if leader == "a" { "b" } else { "a" };
        assert_eq!(
            game.state(Some(&leader)).can_take_from_left.as_deref(),
            Some(other)
        );
        assert_eq!(game.state(Some(other)).can_take_from_left, None);
        assert_eq!(game.state(None).can_take_from_left, None);
    }
}
