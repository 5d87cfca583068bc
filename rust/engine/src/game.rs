use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Suit, ACE_OF_SPADES};
use crate::deck::Deck;
use crate::errors::GameError;
use crate::player::{Hand, PlayerStatus, MAX_PLAYERS, MIN_PLAYERS};
use crate::rules;

/// Short, case-insensitive game identifier (stored upper-case).
pub type GameId = String;

/// One card laid on the pile by one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play {
    pub player: String,
    pub card: Card,
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Lobby: players join, nothing dealt
    Waiting,
    Playing,
    Finished,
}

/// The most recently completed round, kept for client replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRound {
    pub pile: Vec<Play>,
    pub winner: String,
    pub suit_broken: bool,
}

/// The most recent take-hand move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakenHand {
    pub cards: Vec<Card>,
    pub from: String,
    pub by: String,
}

/// What an accepted card play led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Round still open; `next_player` is up.
    Continued { next_player: String },
    RoundResolved {
        winner: String,
        suit_broken: bool,
        game_over: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeHandOutcome {
    pub taken_from: String,
    pub card_count: usize,
    pub game_over: bool,
}

impl fmt::Display for TakeHandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Took {} cards from {}", self.card_count, self.taken_from)
    }
}

/// Result of a player leaving (or losing their connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Removed from the lobby; the name is free again.
    LeftLobby,
    /// Mid-game: cards kept, only the connection flag dropped.
    Disconnected { was_current: bool },
}

/// A single Kazhutha table.
///
/// The session owns every piece of game state and changes it only through
/// its operations. Each operation either fails without touching anything or
/// applies completely; callers are expected to serialize access per session.
#[derive(Debug, Clone)]
pub struct GameSession {
    id: GameId,
    host: String,
    /// Seating order fixed in the lobby
    seating: Vec<String>,
    hands: HashMap<String, Hand>,
    /// Seated players still holding cards, in seating order
    active: Vec<String>,
    /// Index into `active` of whose turn it is
    turn: usize,
    pile: Vec<Play>,
    round_suit: Option<Suit>,
    phase: Phase,
    first_card_played: bool,
    winners: Vec<String>,
    kazhutha: Option<String>,
    discarded: Vec<Card>,
    connected: HashSet<String>,
    original_players: Vec<String>,
    waiting_for: Option<String>,
    last_action: Option<String>,
    last_round: Option<ResolvedRound>,
    last_take: Option<TakenHand>,
}

impl GameSession {
    pub fn new(id: impl Into<GameId>, host: impl Into<String>) -> Self {
        let host = host.into();
        let mut hands = HashMap::new();
        hands.insert(host.clone(), Hand::new());
        Self {
            id: id.into(),
            seating: vec![host.clone()],
            host,
            hands,
            active: Vec::new(),
            turn: 0,
            pile: Vec::new(),
            round_suit: None,
            phase: Phase::Waiting,
            first_card_played: false,
            winners: Vec::new(),
            kazhutha: None,
            discarded: Vec::new(),
            connected: HashSet::new(),
            original_players: Vec::new(),
            waiting_for: None,
            last_action: None,
            last_round: None,
            last_take: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.phase != Phase::Waiting
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn seating(&self) -> &[String] {
        &self.seating
    }

    pub fn active_players(&self) -> &[String] {
        &self.active
    }

    pub fn winners(&self) -> &[String] {
        &self.winners
    }

    pub fn kazhutha(&self) -> Option<&str> {
        self.kazhutha.as_deref()
    }

    pub fn is_member(&self, player: &str) -> bool {
        self.hands.contains_key(player)
    }

    pub fn hand(&self, player: &str) -> Option<&[Card]> {
        self.hands.get(player).map(Hand::cards)
    }

    pub fn card_count(&self, player: &str) -> usize {
        self.hands.get(player).map_or(0, Hand::len)
    }

    pub fn pile(&self) -> &[Play] {
        &self.pile
    }

    pub fn round_suit(&self) -> Option<Suit> {
        self.round_suit
    }

    pub fn round_in_progress(&self) -> bool {
        !self.pile.is_empty()
    }

    pub fn discarded_count(&self) -> usize {
        self.discarded.len()
    }

    pub fn is_connected(&self, player: &str) -> bool {
        self.connected.contains(player)
    }

    pub fn original_players(&self) -> &[String] {
        &self.original_players
    }

    pub fn waiting_for(&self) -> Option<&str> {
        self.waiting_for.as_deref()
    }

    pub fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    pub fn last_round(&self) -> Option<&ResolvedRound> {
        self.last_round.as_ref()
    }

    pub fn last_take(&self) -> Option<&TakenHand> {
        self.last_take.as_ref()
    }

    /// Whose turn it is, derived from the active list on every call.
    pub fn current_player(&self) -> Option<&str> {
        if self.active.is_empty() {
            return None;
        }
        Some(self.active[self.turn % self.active.len()].as_str())
    }

    pub fn player_status(&self, player: &str) -> Option<PlayerStatus> {
        if !self.is_started() || !self.is_member(player) {
            return None;
        }
        if self.winners.iter().any(|w| w == player) {
            return Some(PlayerStatus::Won);
        }
        Some(if self.connected.contains(player) {
            PlayerStatus::ConnectedActive
        } else if self.is_finished() {
            PlayerStatus::NeverReconnected
        } else {
            PlayerStatus::DisconnectedActive
        })
    }

    pub fn ensure_host(&self, player: &str) -> Result<(), GameError> {
        if self.host == player {
            Ok(())
        } else {
            Err(GameError::NotHost)
        }
    }

    // ---- lobby ----

    pub fn add_player(&mut self, player: &str) -> Result<(), GameError> {
        if self.is_started() {
            return Err(GameError::GameAlreadyStarted);
        }
        if self.hands.contains_key(player) {
            return Err(GameError::NameTaken(player.to_string()));
        }
        if self.hands.len() >= MAX_PLAYERS {
            return Err(GameError::LobbyFull { max: MAX_PLAYERS });
        }
        self.hands.insert(player.to_string(), Hand::new());
        self.seating.push(player.to_string());
        Ok(())
    }

    /// A player left. In the lobby they are removed outright; once dealt
    /// they keep their seat and cards and are only marked disconnected.
    pub fn remove_player(&mut self, player: &str) -> Result<Departure, GameError> {
        if !self.hands.contains_key(player) {
            return Err(GameError::UnknownPlayer(player.to_string()));
        }

        if !self.is_started() {
            self.hands.remove(player);
            self.seating.retain(|p| p != player);
            self.connected.remove(player);
            return Ok(Departure::LeftLobby);
        }

        self.connected.remove(player);
        let was_current =
            self.current_player() == Some(player) && self.active.iter().any(|p| p == player);
        if was_current {
            self.waiting_for = Some(player.to_string());
        }
        Ok(Departure::Disconnected { was_current })
    }

    // ---- dealing ----

    pub fn start_game(&mut self) -> Result<(), GameError> {
        self.start_game_with_deck(Deck::new_random())
    }

    /// Deals `deck` round-robin in seating order and hands the first turn
    /// to whoever holds the Ace of Spades.
    pub fn start_game_with_deck(&mut self, mut deck: Deck) -> Result<(), GameError> {
        if self.is_started() {
            return Err(GameError::GameAlreadyStarted);
        }
        if self.seating.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers {
                minimum: MIN_PLAYERS,
                actual: self.seating.len(),
            });
        }
        if deck.remaining() != 52 {
            return Err(GameError::InvalidDeck(format!(
                "{} cards left to deal",
                deck.remaining()
            )));
        }

        let dealt: Vec<Hand> = deck
            .deal_round_robin(self.seating.len())
            .into_iter()
            .map(Hand::from_cards)
            .collect();
        let leader = dealt
            .iter()
            .position(|hand| hand.contains(&ACE_OF_SPADES))
            .ok_or_else(|| GameError::InvalidDeck("no Ace of Spades dealt".into()))?;

        for (player, hand) in self.seating.iter().zip(dealt) {
            self.hands.insert(player.clone(), hand);
        }
        self.active = self.seating.clone();
        self.turn = leader;
        self.phase = Phase::Playing;
        self.first_card_played = false;
        self.original_players = self.seating.clone();
        self.connected = self.seating.iter().cloned().collect();
        self.last_action = Some(format!(
            "{} holds the {} and leads",
            self.seating[leader], ACE_OF_SPADES
        ));
        Ok(())
    }

    // ---- turns ----

    pub fn play_card(&mut self, player: &str, card: Card) -> Result<PlayOutcome, GameError> {
        if self.phase != Phase::Playing {
            return Err(GameError::NotInProgress);
        }
        if self.current_player() != Some(player) {
            return Err(GameError::NotYourTurn);
        }
        if !self.active.iter().any(|p| p == player) {
            return Err(GameError::NotActive);
        }
        let hand = self
            .hands
            .get(player)
            .ok_or_else(|| GameError::UnknownPlayer(player.to_string()))?;
        let opening = self.pile.is_empty();
        let round_suit = if opening { None } else { self.round_suit };
        rules::validate_play(hand, card, round_suit, self.first_card_played)?;

        self.first_card_played = true;
        if self.waiting_for.as_deref() == Some(player) {
            self.waiting_for = None;
        }
        if opening {
            self.round_suit = Some(card.suit);
            self.last_round = None;
            self.last_take = None;
        }
        if let Some(hand) = self.hands.get_mut(player) {
            hand.remove(&card);
        }
        self.pile.push(Play {
            player: player.to_string(),
            card,
        });
        self.last_action = Some(format!("{player} played {card}"));

        let opening_suit = self
            .round_suit
            .ok_or(GameError::CorruptRound("open round without a suit"))?;
        if card.suit != opening_suit {
            return self.resolve_round(true);
        }

        let played: HashSet<&str> = self.pile.iter().map(|p| p.player.as_str()).collect();
        if played.len() == self.active.len() {
            return self.resolve_round(false);
        }

        let next_player = self.advance_turn(player);
        Ok(PlayOutcome::Continued { next_player })
    }

    fn advance_turn(&mut self, from: &str) -> String {
        self.turn = match self.active.iter().position(|p| p == from) {
            Some(idx) => (idx + 1) % self.active.len(),
            None => 0,
        };
        self.current_player().unwrap_or_default().to_string()
    }

    fn resolve_round(&mut self, suit_broken: bool) -> Result<PlayOutcome, GameError> {
        let opening_suit = self
            .round_suit
            .ok_or(GameError::CorruptRound("no round in progress"))?;
        let winner = rules::round_winner(&self.pile, opening_suit)?.to_string();
        if !self.hands.contains_key(&winner) {
            return Err(GameError::CorruptRound("round winner has no seat"));
        }

        let pile = std::mem::take(&mut self.pile);
        if suit_broken {
            if let Some(hand) = self.hands.get_mut(&winner) {
                hand.extend(pile.iter().map(|play| play.card));
            }
            self.last_action = Some(format!("{winner} picks up the pile!"));
        } else {
            self.discarded.extend(pile.iter().map(|play| play.card));
            self.last_action = Some(format!("Cards discarded - {winner} leads next!"));
        }
        self.last_round = Some(ResolvedRound {
            pile,
            winner: winner.clone(),
            suit_broken,
        });
        self.round_suit = None;

        self.collect_winners();
        self.turn = self.next_leader(&winner);
        let game_over = self.check_game_over();

        Ok(PlayOutcome::RoundResolved {
            winner,
            suit_broken,
            game_over,
        })
    }

    /// Moves every active player with an empty hand onto the winners list,
    /// in active order.
    fn collect_winners(&mut self) {
        let emptied: Vec<String> = self
            .active
            .iter()
            .filter(|p| self.card_count(p) == 0 && !self.winners.contains(p))
            .cloned()
            .collect();
        for player in emptied {
            self.active.retain(|p| p != &player);
            self.winners.push(player);
        }
    }

    /// Round winner leads if still active, otherwise the next active player
    /// clockwise from the winner's seat.
    fn next_leader(&self, winner: &str) -> usize {
        if let Some(idx) = self.active.iter().position(|p| p == winner) {
            return idx;
        }
        let Some(seat) = self.seating.iter().position(|p| p == winner) else {
            return 0;
        };
        let n = self.seating.len();
        (1..n)
            .map(|offset| &self.seating[(seat + offset) % n])
            .find_map(|candidate| self.active.iter().position(|p| p == candidate))
            .unwrap_or(0)
    }

    fn check_game_over(&mut self) -> bool {
        let holding: Vec<String> = self
            .active
            .iter()
            .filter(|p| self.card_count(p) > 0)
            .cloned()
            .collect();
        match holding.as_slice() {
            [loser] => {
                let loser = loser.clone();
                self.last_action = Some(format!("{loser} is the Kazhutha!"));
                self.kazhutha = Some(loser);
                self.phase = Phase::Finished;
                true
            }
            [] => {
                self.phase = Phase::Finished;
                true
            }
            _ => false,
        }
    }

    // ---- take hand ----

    /// The next active player after `player`, if it is someone else.
    pub fn left_neighbor(&self, player: &str) -> Option<&str> {
        let idx = self.active.iter().position(|p| p == player)?;
        let next = &self.active[(idx + 1) % self.active.len()];
        (next != player).then_some(next.as_str())
    }

    /// Who `player` could take a hand from right now, if anyone.
    pub fn can_take_from_left(&self, player: &str) -> Option<&str> {
        if self.phase != Phase::Playing
            || self.round_in_progress()
            || self.current_player() != Some(player)
        {
            return None;
        }
        self.left_neighbor(player)
            .filter(|neighbor| self.card_count(neighbor) > 0)
    }

    pub fn take_hand_from_left(&mut self, player: &str) -> Result<TakeHandOutcome, GameError> {
        if self.phase != Phase::Playing {
            return Err(GameError::NotInProgress);
        }
        if self.round_in_progress() {
            return Err(GameError::RoundInProgress);
        }
        if !self.active.iter().any(|p| p == player) {
            return Err(GameError::NotActive);
        }
        if self.current_player() != Some(player) {
            return Err(GameError::TakeHandNotYourTurn);
        }
        let neighbor = self
            .left_neighbor(player)
            .ok_or(GameError::NoLeftNeighbor)?
            .to_string();
        if self.card_count(&neighbor) == 0 {
            return Err(GameError::NeighborHasNoCards(neighbor));
        }

        let taken = self
            .hands
            .get_mut(&neighbor)
            .map(Hand::take_all)
            .unwrap_or_default();
        if let Some(hand) = self.hands.get_mut(player) {
            hand.extend(taken.iter().copied());
        }
        let card_count = taken.len();
        self.last_take = Some(TakenHand {
            cards: taken,
            from: neighbor.clone(),
            by: player.to_string(),
        });
        self.last_round = None;
        if self.waiting_for.as_deref() == Some(player) {
            self.waiting_for = None;
        }

        self.active.retain(|p| p != &neighbor);
        self.winners.push(neighbor.clone());
        let game_over = self.check_game_over();
        // the take is what clients see last, even when it ends the game
        self.last_action = Some(format!("{player} took {neighbor}'s hand!"));
        if let Some(idx) = self.active.iter().position(|p| p == player) {
            self.turn = idx;
        }

        Ok(TakeHandOutcome {
            taken_from: neighbor,
            card_count,
            game_over,
        })
    }

    // ---- connections ----

    pub fn can_rejoin(&self, player: &str) -> Result<(), GameError> {
        match self.phase {
            Phase::Waiting => return Err(GameError::RejoinBeforeStart),
            Phase::Finished => return Err(GameError::GameFinished),
            Phase::Playing => {}
        }
        if !self.original_players.iter().any(|p| p == player) {
            return Err(GameError::NotOriginalPlayer);
        }
        if self.connected.contains(player) {
            return Err(GameError::AlreadyConnected);
        }
        Ok(())
    }

    pub fn reconnect(&mut self, player: &str) -> Result<(), GameError> {
        self.can_rejoin(player)?;
        self.apply_reconnect(player);
        Ok(())
    }

    /// Reconnects `player` if the rejoin rules allow it; returns whether it did.
    pub fn mark_connected(&mut self, player: &str) -> bool {
        if self.can_rejoin(player).is_err() {
            return false;
        }
        self.apply_reconnect(player);
        true
    }

    fn apply_reconnect(&mut self, player: &str) {
        self.connected.insert(player.to_string());

        if self.card_count(player) > 0 && !self.active.iter().any(|p| p == player) {
            let seat_of = |name: &str| self.seating.iter().position(|p| p == name);
            let seat = seat_of(player);
            let insert_at = self
                .active
                .iter()
                .take_while(|p| seat_of(p.as_str()) < seat)
                .count();
            if !self.active.is_empty() && insert_at <= self.turn {
                self.turn += 1;
            }
            self.active.insert(insert_at, player.to_string());
        }

        if self.waiting_for.as_deref() == Some(player) {
            if let Some(idx) = self.active.iter().position(|p| p == player) {
                self.turn = idx;
            }
            self.waiting_for = None;
        }
    }

    // ---- rematch ----

    /// Back to the lobby with the same roster and host.
    pub fn reset_game(&mut self) -> Result<(), GameError> {
        if !self.is_finished() {
            return Err(GameError::NotFinished);
        }
        for hand in self.hands.values_mut() {
            hand.clear();
        }
        self.active.clear();
        self.turn = 0;
        self.pile.clear();
        self.round_suit = None;
        self.phase = Phase::Waiting;
        self.first_card_played = false;
        self.winners.clear();
        self.kazhutha = None;
        self.discarded.clear();
        self.original_players.clear();
        self.waiting_for = None;
        self.last_action = None;
        self.last_round = None;
        self.last_take = None;
        Ok(())
    }
}

#[cfg(test)]
impl GameSession {
    fn force_hand(&mut self, player: &str, cards: Vec<Card>) {
        self.hands.insert(player.to_string(), Hand::from_cards(cards));
    }

    fn force_turn(&mut self, player: &str) {
        if let Some(idx) = self.active.iter().position(|p| p == player) {
            self.turn = idx;
        }
    }
}
