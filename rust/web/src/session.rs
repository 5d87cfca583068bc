use crate::events::{EventBus, EventSubscription, GameEvent};
use crate::settings::AppSettings;
use kazhutha_engine::cards::Card;
use kazhutha_engine::errors::GameError;
use kazhutha_engine::game::{Departure, GameId, GameSession, TakeHandOutcome};
use kazhutha_engine::snapshot::GameStateView;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(120 * 60);
const DEFAULT_FINISHED_TTL: Duration = Duration::from_secs(30 * 60);
const GAME_ID_LEN: usize = 6;

/// Upper-cased, trimmed form of a client-supplied game id.
pub fn normalize_game_id(raw: &str) -> GameId {
    raw.trim().to_uppercase()
}

/// Trimmed player name; blank names are refused.
pub fn normalize_player_name(raw: &str) -> Result<String, SessionError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SessionError::InvalidRequest("Player name required".into()));
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedGame {
    pub game_id: GameId,
    pub player_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub game_id: GameId,
    pub rejoined: bool,
}

/// One table in the registry: the game behind its own lock, plus the
/// last time anyone touched it.
#[derive(Debug)]
pub struct SessionEntry {
    game: Mutex<GameSession>,
    last_active: Mutex<Instant>,
}

impl SessionEntry {
    fn new(game: GameSession) -> Self {
        Self {
            game: Mutex::new(game),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, GameSession>, SessionError> {
        self.game.lock().map_err(|_| SessionError::StoragePoisoned)
    }

    fn touch(&self) {
        if let Ok(mut guard) = self.last_active.lock() {
            *guard = Instant::now();
        }
    }

    fn is_expired(&self, session_ttl: Duration, finished_ttl: Duration) -> bool {
        let finished = self
            .game
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_finished();
        let ttl = if finished { finished_ttl } else { session_ttl };
        match self.last_active.lock() {
            Ok(last) => last.elapsed() >= ttl,
            Err(_) => false,
        }
    }

    #[cfg(test)]
    fn force_last_active(&self, instant: Instant) {
        if let Ok(mut guard) = self.last_active.lock() {
            *guard = instant;
        }
    }
}

/// Registry of live games.
///
/// Each operation resolves the game, takes its lock, applies one mutation,
/// and fans the fresh per-player snapshots out through the [`EventBus`]
/// before releasing the lock, so clients see updates in mutation order.
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<GameId, Arc<SessionEntry>>>,
    event_bus: Arc<EventBus>,
    session_ttl: Duration,
    finished_ttl: Duration,
}

impl SessionManager {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self::with_ttl(event_bus, DEFAULT_SESSION_TTL, DEFAULT_FINISHED_TTL)
    }

    pub fn with_ttl(event_bus: Arc<EventBus>, session_ttl: Duration, finished_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            event_bus,
            session_ttl,
            finished_ttl,
        }
    }

    pub fn from_settings(event_bus: Arc<EventBus>, settings: &AppSettings) -> Self {
        Self::with_ttl(event_bus, settings.session_ttl(), settings.finished_session_ttl())
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn create_session(&self, host_name: &str) -> Result<CreatedGame, SessionError> {
        let host = normalize_player_name(host_name)?;

        let game_id = {
            let mut guard = self
                .sessions
                .write()
                .map_err(|_| SessionError::StoragePoisoned)?;
            let mut id = new_game_id();
            while guard.contains_key(&id) {
                id = new_game_id();
            }
            let game = GameSession::new(id.clone(), host.clone());
            guard.insert(id.clone(), Arc::new(SessionEntry::new(game)));
            id
        };

        tracing::info!(game_id = %game_id, host = %host, "creating new game session");

        Ok(CreatedGame {
            game_id,
            player_name: host,
        })
    }

    /// Joins the lobby, or, once the game has started, rejoins as an
    /// original player.
    pub fn join(&self, game_id: &str, player_name: &str) -> Result<JoinOutcome, SessionError> {
        let player = normalize_player_name(player_name)?;
        self.with_game(game_id, |game| {
            let id = game.id().to_string();
            if game.is_started() {
                game.reconnect(&player)?;
                tracing::info!(game_id = %id, player = %player, "player rejoined running game");
                self.broadcast_state(game, |view| GameEvent::PlayerReconnected {
                    player_name: player.clone(),
                    game_state: view,
                });
                return Ok(JoinOutcome {
                    game_id: id,
                    rejoined: true,
                });
            }

            game.add_player(&player)?;
            tracing::debug!(game_id = %id, player = %player, "player joined lobby");
            self.broadcast_state(game, |view| GameEvent::PlayerJoined {
                player_name: player.clone(),
                game_state: view,
            });
            Ok(JoinOutcome {
                game_id: id,
                rejoined: false,
            })
        })
    }

    pub fn start(&self, game_id: &str, player_name: &str) -> Result<(), SessionError> {
        let player = player_name.trim();
        self.with_game(game_id, |game| {
            game.ensure_host(player)?;
            game.start_game()?;
            tracing::info!(
                game_id = %game.id(),
                players = game.seating().len(),
                leader = ?game.current_player(),
                "game started"
            );
            self.broadcast_state(game, |view| GameEvent::GameStarted { game_state: view });
            Ok(())
        })
    }

    /// Host-only rematch: sends a finished game back to its lobby.
    pub fn play_again(&self, game_id: &str, player_name: &str) -> Result<(), SessionError> {
        let player = player_name.trim();
        self.with_game(game_id, |game| {
            if !game.is_finished() {
                return Err(GameError::NotFinished.into());
            }
            game.ensure_host(player)?;
            game.reset_game()?;
            tracing::info!(game_id = %game.id(), "game reset to lobby");
            self.broadcast_state(game, |view| GameEvent::GameReset { game_state: view });
            Ok(())
        })
    }

    /// Plays a card and returns the caller's fresh view.
    pub fn play_card(
        &self,
        game_id: &str,
        player_name: &str,
        card: Card,
    ) -> Result<GameStateView, SessionError> {
        let player = player_name.trim();
        self.with_game(game_id, |game| {
            let outcome = game.play_card(player, card)?;
            tracing::debug!(
                game_id = %game.id(),
                player = %player,
                card = %card,
                outcome = ?outcome,
                "card played"
            );
            if game.is_finished() {
                tracing::info!(
                    game_id = %game.id(),
                    kazhutha = ?game.kazhutha(),
                    "game finished"
                );
            }
            self.broadcast_state(game, |view| GameEvent::CardPlayed {
                player: player.to_string(),
                card,
                game_state: view,
            });
            Ok(game.state(Some(player)))
        })
    }

    pub fn take_hand(
        &self,
        game_id: &str,
        player_name: &str,
    ) -> Result<(TakeHandOutcome, GameStateView), SessionError> {
        let player = player_name.trim();
        self.with_game(game_id, |game| {
            let outcome = game.take_hand_from_left(player)?;
            tracing::debug!(
                game_id = %game.id(),
                player = %player,
                taken_from = %outcome.taken_from,
                cards = outcome.card_count,
                "hand taken"
            );
            if outcome.game_over {
                tracing::info!(
                    game_id = %game.id(),
                    kazhutha = ?game.kazhutha(),
                    "game finished"
                );
            }
            self.broadcast_state(game, |view| GameEvent::HandTaken {
                player: player.to_string(),
                taken_from: outcome.taken_from.clone(),
                game_state: view,
            });
            let view = game.state(Some(player));
            Ok((outcome, view))
        })
    }

    pub fn state(
        &self,
        game_id: &str,
        player_name: Option<&str>,
    ) -> Result<GameStateView, SessionError> {
        let player = player_name.map(str::trim).filter(|p| !p.is_empty());
        self.with_game(game_id, |game| Ok(game.state(player)))
    }

    /// Attaches a live stream for `player_name`. An original player of a
    /// running game is marked connected again; the stream then receives a
    /// `connected` event with the player's own view.
    pub fn connect(
        self: &Arc<Self>,
        game_id: &str,
        player_name: &str,
    ) -> Result<PlayerConnection, SessionError> {
        let player = normalize_player_name(player_name)?;
        let entry = self.entry(game_id)?;
        let subscription = self.event_bus.subscribe(normalize_game_id(game_id), player.clone());

        {
            let mut game = entry.lock()?;
            entry.touch();
            let is_original = game.original_players().iter().any(|p| p == &player);
            if game.is_started() && is_original && game.mark_connected(&player) {
                tracing::info!(game_id = %game.id(), player = %player, "player reconnected");
                self.broadcast_state(&game, |view| GameEvent::PlayerReconnected {
                    player_name: player.clone(),
                    game_state: view,
                });
            }
            self.event_bus.send_to(
                game.id(),
                subscription.id(),
                GameEvent::Connected {
                    game_state: game.state(Some(&player)),
                },
            );
        }

        Ok(PlayerConnection {
            manager: Arc::clone(self),
            subscription: Some(subscription),
        })
    }

    /// A player's last live stream closed.
    ///
    /// The open-stream count is read under the game lock, so a `connect`
    /// racing with this call either is seen here or reconnects afterwards.
    pub fn disconnect(&self, game_id: &str, player_name: &str) -> Result<(), SessionError> {
        self.with_game(game_id, |game| {
            if self.event_bus.player_subscriptions(game.id(), player_name) > 0 {
                return Ok(());
            }
            let departure = match game.remove_player(player_name) {
                Ok(departure) => departure,
                Err(GameError::UnknownPlayer(_)) => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            tracing::info!(
                game_id = %game.id(),
                player = %player_name,
                departure = ?departure,
                "player disconnected"
            );

            let lobby_or_done = matches!(departure, Departure::LeftLobby) || game.is_finished();
            if game.host() == player_name && lobby_or_done {
                self.event_bus.broadcast(
                    game.id(),
                    GameEvent::HostLeft {
                        player_name: player_name.to_string(),
                    },
                );
            } else {
                self.broadcast_state(game, |view| GameEvent::PlayerDisconnected {
                    player_name: player_name.to_string(),
                    game_state: view,
                });
            }
            Ok(())
        })
    }

    pub fn delete_session(&self, game_id: &str) -> Result<(), SessionError> {
        let id = normalize_game_id(game_id);
        match self.remove_session(&id)? {
            Some(_) => {
                self.event_bus.broadcast(
                    &id,
                    GameEvent::GameEnded {
                        game_id: id.clone(),
                        reason: "terminated_by_request".into(),
                    },
                );
                self.event_bus.drop_session(&id);
                Ok(())
            }
            None => Err(SessionError::NotFound(id)),
        }
    }

    /// Drops idle games. Returns how many were evicted.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let mut expired = Vec::new();
        {
            let mut guard = self
                .sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            guard.retain(|id, entry| {
                if entry.is_expired(self.session_ttl, self.finished_ttl) {
                    expired.push(id.clone());
                    false
                } else {
                    true
                }
            });
        }

        for id in &expired {
            tracing::info!(game_id = %id, "evicting idle game");
            self.event_bus.broadcast(
                id,
                GameEvent::GameEnded {
                    game_id: id.clone(),
                    reason: "expired".into(),
                },
            );
            self.event_bus.drop_session(id);
        }
        expired.len()
    }

    pub fn active_sessions(&self) -> Vec<GameId> {
        match self.sessions.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn entry(&self, game_id: &str) -> Result<Arc<SessionEntry>, SessionError> {
        let id = normalize_game_id(game_id);
        let entry = {
            let guard = self
                .sessions
                .read()
                .map_err(|_| SessionError::StoragePoisoned)?;
            guard
                .get(&id)
                .cloned()
                .ok_or_else(|| SessionError::NotFound(id.clone()))?
        };
        if entry.is_expired(self.session_ttl, self.finished_ttl) {
            self.expire_session(&id)?;
            return Err(SessionError::Expired(id));
        }
        Ok(entry)
    }

    /// Runs `op` with the game locked. The lock is held across the
    /// mutation and its broadcast.
    fn with_game<T, F>(&self, game_id: &str, op: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut GameSession) -> Result<T, SessionError>,
    {
        let entry = self.entry(game_id)?;
        let mut game = entry.lock()?;
        entry.touch();
        let result = op(&mut game);
        if let Err(err) = &result {
            tracing::warn!(game_id = %game.id(), error = %err, "operation rejected");
        }
        result
    }

    fn broadcast_state<F>(&self, game: &GameSession, event: F)
    where
        F: Fn(GameStateView) -> GameEvent,
    {
        self.event_bus
            .broadcast_with(game.id(), |player| event(game.state(Some(player))));
    }

    fn expire_session(&self, game_id: &str) -> Result<(), SessionError> {
        if self.remove_session(game_id)?.is_some() {
            tracing::info!(game_id = %game_id, "game expired on access");
            self.event_bus.broadcast(
                game_id,
                GameEvent::GameEnded {
                    game_id: game_id.to_string(),
                    reason: "expired".into(),
                },
            );
            self.event_bus.drop_session(game_id);
        }
        Ok(())
    }

    fn remove_session(&self, game_id: &str) -> Result<Option<Arc<SessionEntry>>, SessionError> {
        match self.sessions.write() {
            Ok(mut guard) => Ok(guard.remove(game_id)),
            Err(_) => Err(SessionError::StoragePoisoned),
        }
    }

    #[cfg(test)]
    fn get_entry(&self, game_id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions
            .read()
            .ok()
            .and_then(|guard| guard.get(game_id).cloned())
    }
}

fn new_game_id() -> GameId {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(GAME_ID_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// A player's live stream on one game.
///
/// Dropping it unsubscribes; if that was the player's last stream the
/// player is disconnected from the game.
#[derive(Debug)]
pub struct PlayerConnection {
    manager: Arc<SessionManager>,
    subscription: Option<EventSubscription>,
}

impl PlayerConnection {
    pub fn subscription_mut(&mut self) -> Option<&mut EventSubscription> {
        self.subscription.as_mut()
    }

    pub fn player(&self) -> Option<&str> {
        self.subscription.as_ref().map(EventSubscription::player)
    }
}

impl Drop for PlayerConnection {
    fn drop(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        let game_id = subscription.game_id().to_string();
        let player = subscription.player().to_string();
        drop(subscription);

        match self.manager.disconnect(&game_id, &player) {
            Ok(()) => {}
            Err(SessionError::NotFound(_)) | Err(SessionError::Expired(_)) => {}
            Err(err) => {
                tracing::warn!(
                    game_id = %game_id,
                    player = %player,
                    error = %err,
                    "failed to record disconnect"
                );
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Game not found")]
    NotFound(GameId),
    #[error("{0}")]
    Game(#[from] GameError),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Game expired: {0}")]
    Expired(GameId),
    #[error("Session storage poisoned")]
    StoragePoisoned,
}

impl crate::errors::IntoErrorResponse for SessionError {
    fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Expired(_) => StatusCode::GONE,
            SessionError::Game(GameError::NotHost) => StatusCode::FORBIDDEN,
            SessionError::Game(err) if err.is_defect() => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::Game(_) => StatusCode::BAD_REQUEST,
            SessionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SessionError::StoragePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "game_not_found",
            SessionError::Expired(_) => "game_expired",
            SessionError::Game(err) => err.code(),
            SessionError::InvalidRequest(_) => "invalid_request",
            SessionError::StoragePoisoned => "session_storage_error",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            SessionError::NotFound(id) => Some(serde_json::json!({
                "game_id": id
            })),
            SessionError::Expired(id) => Some(serde_json::json!({
                "game_id": id,
                "reason": "Game expired due to inactivity"
            })),
            _ => None,
        }
    }

    fn severity(&self) -> crate::errors::ErrorSeverity {
        use crate::errors::ErrorSeverity;
        match self {
            SessionError::StoragePoisoned => ErrorSeverity::Critical,
            SessionError::Game(err) if err.is_defect() => ErrorSeverity::Server,
            _ => ErrorSeverity::Client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IntoErrorResponse;
    use kazhutha_engine::cards::ACE_OF_SPADES;
    use kazhutha_engine::game::Phase;
    use std::collections::HashSet;
    use std::thread;
    use warp::http::StatusCode;

    fn manager() -> Arc<SessionManager> {
        Arc::new(SessionManager::new(Arc::new(EventBus::new())))
    }

    fn lobby_of(manager: &SessionManager, players: &[&str]) -> GameId {
        let created = manager.create_session(players[0]).expect("create");
        for p in &players[1..] {
            manager.join(&created.game_id, p).expect("join");
        }
        created.game_id
    }

    fn drain(sub: &mut EventSubscription) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while let Ok(event) = sub.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn created_ids_are_six_uppercase_chars() {
        let manager = manager();
        let created = manager.create_session("  Ann  ").expect("create");
        assert_eq!(created.game_id.len(), 6);
        assert_eq!(created.game_id, created.game_id.to_uppercase());
        assert_eq!(created.player_name, "Ann");

        let view = manager
            .state(&created.game_id.to_lowercase(), None)
            .expect("lookup is case-insensitive");
        assert_eq!(view.game_state, Phase::Waiting);
    }

    #[test]
    fn blank_names_are_rejected() {
        let manager = manager();
        assert!(matches!(
            manager.create_session("   "),
            Err(SessionError::InvalidRequest(_))
        ));
        let id = lobby_of(&manager, &["ann"]);
        assert!(matches!(
            manager.join(&id, ""),
            Err(SessionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn unknown_games_are_not_found() {
        let manager = manager();
        let err = manager.state("NOPE00", None).expect_err("missing");
        assert!(matches!(err, SessionError::NotFound(ref id) if id == "NOPE00"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn only_the_host_starts() {
        let manager = manager();
        let id = lobby_of(&manager, &["ann", "bob"]);

        let err = manager.start(&id, "bob").expect_err("guest cannot start");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.error_code(), "not_host");

        manager.start(&id, "ann").expect("host starts");
        assert_eq!(
            manager.state(&id, None).expect("state").game_state,
            Phase::Playing
        );
    }

    #[test]
    fn join_after_start_is_a_rejoin() {
        let manager = manager();
        let id = lobby_of(&manager, &["ann", "bob"]);
        manager.start(&id, "ann").expect("start");

        let err = manager.join(&id, "cat").expect_err("stranger");
        assert_eq!(err.error_code(), "not_original_player");
        let err = manager.join(&id, "bob").expect_err("still connected");
        assert_eq!(err.error_code(), "already_connected");

        manager.disconnect(&id, "bob").expect("drop");
        let outcome = manager.join(&id, "bob").expect("rejoin");
        assert!(outcome.rejoined);
        assert!(manager.state(&id, None).expect("state").players[1].is_connected);
    }

    #[test]
    fn broadcasts_carry_each_recipients_own_hand() {
        let manager = manager();
        let bus = manager.event_bus();
        let id = lobby_of(&manager, &["ann", "bob"]);
        let mut ann = bus.subscribe(id.clone(), "ann");
        let mut bob = bus.subscribe(id.clone(), "bob");

        manager.start(&id, "ann").expect("start");

        let ann_events = drain(&mut ann);
        let bob_events = drain(&mut bob);
        assert_eq!(ann_events.len(), 1);
        assert_eq!(bob_events.len(), 1);

        let ann_view = ann_events[0].game_state().expect("view");
        let bob_view = bob_events[0].game_state().expect("view");
        assert_eq!(ann_events[0].kind(), "game_started");
        assert_eq!(ann_view.your_hand.as_ref().map(Vec::len), Some(26));
        assert_eq!(bob_view.your_hand.as_ref().map(Vec::len), Some(26));
        assert_ne!(ann_view.your_hand, bob_view.your_hand);
    }

    #[test]
    fn rejected_plays_do_not_broadcast() {
        let manager = manager();
        let bus = manager.event_bus();
        let id = lobby_of(&manager, &["ann", "bob"]);
        manager.start(&id, "ann").expect("start");
        let mut ann = bus.subscribe(id.clone(), "ann");

        let leader = manager
            .state(&id, None)
            .expect("state")
            .current_player
            .expect("leader");
        let other = if leader == "ann" { "bob" } else { "ann" };

        let err = manager
            .play_card(&id, other, ACE_OF_SPADES)
            .expect_err("out of turn");
        assert_eq!(err.error_code(), "not_your_turn");
        assert!(drain(&mut ann).is_empty());

        let view = manager
            .play_card(&id, &leader, ACE_OF_SPADES)
            .expect("opening play");
        assert_eq!(view.current_player.as_deref(), Some(other));
        let events = drain(&mut ann);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            GameEvent::CardPlayed { player, card, .. } if player == &leader && *card == ACE_OF_SPADES
        ));
    }

    #[test]
    fn play_again_needs_a_finished_game_and_the_host() {
        let manager = manager();
        let id = lobby_of(&manager, &["ann", "bob"]);
        manager.start(&id, "ann").expect("start");

        let err = manager.play_again(&id, "ann").expect_err("not finished");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "not_finished");

        let leader = manager
            .state(&id, None)
            .expect("state")
            .current_player
            .expect("leader");
        let (outcome, view) = manager.take_hand(&id, &leader).expect("take");
        assert!(outcome.game_over);
        assert_eq!(view.game_state, Phase::Finished);
        assert_eq!(view.kazhutha.as_deref(), Some(leader.as_str()));

        let err = manager.play_again(&id, "bob").expect_err("guest");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        manager.play_again(&id, "ann").expect("host resets");
        assert_eq!(
            manager.state(&id, None).expect("state").game_state,
            Phase::Waiting
        );
    }

    #[test]
    fn connect_sends_connected_and_drop_disconnects() {
        let manager = manager();
        let id = lobby_of(&manager, &["ann", "bob"]);
        manager.start(&id, "ann").expect("start");

        let mut watcher = manager.event_bus().subscribe(id.clone(), "observer");
        let mut conn = manager.connect(&id, "bob").expect("connect");
        let first = conn
            .subscription_mut()
            .expect("subscription")
            .receiver
            .try_recv()
            .expect("connected event");
        assert_eq!(first.kind(), "connected");
        assert_eq!(
            first.game_state().and_then(|v| v.your_hand.as_ref()).map(Vec::len),
            Some(26)
        );

        drop(conn);
        let view = manager.state(&id, None).expect("state");
        assert!(!view.players[1].is_connected);
        let events = drain(&mut watcher);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::PlayerDisconnected { player_name, .. } if player_name == "bob")));
    }

    #[test]
    fn reconnecting_stream_restores_the_player() {
        let manager = manager();
        let id = lobby_of(&manager, &["ann", "bob"]);
        manager.start(&id, "ann").expect("start");
        manager.disconnect(&id, "bob").expect("drop");

        let mut watcher = manager.event_bus().subscribe(id.clone(), "ann");
        let _conn = manager.connect(&id, "bob").expect("connect");

        assert!(manager.state(&id, None).expect("state").players[1].is_connected);
        let events = drain(&mut watcher);
        assert!(matches!(
            events.first(),
            Some(GameEvent::PlayerReconnected { player_name, .. }) if player_name == "bob"
        ));
    }

    #[test]
    fn second_stream_keeps_the_player_connected() {
        let manager = manager();
        let id = lobby_of(&manager, &["ann", "bob"]);
        manager.start(&id, "ann").expect("start");

        let first = manager.connect(&id, "bob").expect("first tab");
        let _second = manager.connect(&id, "bob").expect("second tab");
        drop(first);

        assert!(manager.state(&id, None).expect("state").players[1].is_connected);
    }

    #[test]
    fn stream_replaced_during_disconnect_leaves_player_connected() {
        use std::sync::Barrier;

        let manager = manager();
        let id = lobby_of(&manager, &["ann", "bob"]);
        manager.start(&id, "ann").expect("start");

        for round in 0..500 {
            let old = manager.connect(&id, "bob").expect("old stream");
            let barrier = Arc::new(Barrier::new(2));

            let dropper = {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    drop(old);
                })
            };
            let connector = {
                let barrier = Arc::clone(&barrier);
                let manager = Arc::clone(&manager);
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    manager.connect(&id, "bob").expect("new stream")
                })
            };

            dropper.join().expect("dropper");
            let fresh = connector.join().expect("connector");

            let view = manager.state(&id, None).expect("state");
            assert!(
                view.players[1].is_connected,
                "bob disconnected with a live stream in round {round}"
            );
            assert_eq!(view.waiting_for_player, None);
            drop(fresh);
            manager.join(&id, "bob").expect("rejoin for next round");
        }
    }

    #[test]
    fn host_leaving_the_lobby_notifies_everyone() {
        let manager = manager();
        let id = lobby_of(&manager, &["ann", "bob"]);
        let mut bob = manager.event_bus().subscribe(id.clone(), "bob");

        let conn = manager.connect(&id, "ann").expect("host stream");
        drop(conn);

        let events = drain(&mut bob);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::HostLeft { player_name } if player_name == "ann")));
        assert!(!manager
            .state(&id, None)
            .expect("state")
            .player_order
            .contains(&"ann".to_string()));
    }

    #[test]
    fn cleanup_expired_sessions_removes_stale_entries() {
        let bus = Arc::new(EventBus::new());
        let manager = SessionManager::with_ttl(bus, Duration::from_secs(60), Duration::from_secs(5));
        let stale = lobby_of(&manager, &["ann"]);
        let fresh = lobby_of(&manager, &["bob"]);
        let mut sub = manager.event_bus().subscribe(stale.clone(), "ann");

        manager
            .get_entry(&stale)
            .expect("entry")
            .force_last_active(Instant::now() - Duration::from_secs(120));

        assert_eq!(manager.cleanup_expired_sessions(), 1);
        assert_eq!(manager.active_sessions(), vec![fresh]);
        match sub.receiver.try_recv() {
            Ok(GameEvent::GameEnded { reason, .. }) => assert_eq!(reason, "expired"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn finished_games_expire_sooner() {
        let bus = Arc::new(EventBus::new());
        let manager = SessionManager::with_ttl(bus, Duration::from_secs(600), Duration::from_secs(5));
        let id = lobby_of(&manager, &["ann", "bob"]);
        manager.start(&id, "ann").expect("start");
        let entry = manager.get_entry(&id).expect("entry");

        entry.force_last_active(Instant::now() - Duration::from_secs(30));
        assert_eq!(manager.cleanup_expired_sessions(), 0);

        let leader = manager
            .state(&id, None)
            .expect("state")
            .current_player
            .expect("leader");
        manager.take_hand(&id, &leader).expect("finish");
        entry.force_last_active(Instant::now() - Duration::from_secs(30));
        assert_eq!(manager.cleanup_expired_sessions(), 1);
    }

    #[test]
    fn expired_game_reports_gone_on_access() {
        let bus = Arc::new(EventBus::new());
        let manager = SessionManager::with_ttl(bus, Duration::from_secs(1), Duration::from_secs(1));
        let id = lobby_of(&manager, &["ann"]);
        manager
            .get_entry(&id)
            .expect("entry")
            .force_last_active(Instant::now() - Duration::from_secs(5));

        let err = manager.state(&id, None).expect_err("expired");
        assert_eq!(err.status_code(), StatusCode::GONE);
        assert!(matches!(
            manager.state(&id, None),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn delete_session_ends_the_game() {
        let manager = manager();
        let id = lobby_of(&manager, &["ann"]);
        let mut sub = manager.event_bus().subscribe(id.clone(), "ann");

        manager.delete_session(&id).expect("delete");
        assert!(matches!(
            sub.receiver.try_recv(),
            Ok(GameEvent::GameEnded { .. })
        ));
        assert!(matches!(
            manager.delete_session(&id),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_session_creation_is_safe() {
        let manager = manager();

        let mut handles = Vec::new();
        for t in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                (0..32)
                    .map(|i| {
                        manager
                            .create_session(&format!("host{t}-{i}"))
                            .expect("create session")
                            .game_id
                    })
                    .collect::<Vec<_>>()
            }));
        }

        let mut unique = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("join thread") {
                assert!(unique.insert(id));
            }
        }
        assert_eq!(manager.active_sessions().len(), unique.len());
    }

    #[test]
    fn concurrent_joins_never_overfill_a_lobby() {
        let manager = manager();
        let id = lobby_of(&manager, &["host"]);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let id = id.clone();
                thread::spawn(move || manager.join(&id, &format!("p{i}")).is_ok())
            })
            .collect();
        let joined = handles
            .into_iter()
            .map(|h| h.join().expect("join thread"))
            .filter(|ok| *ok)
            .count();

        assert_eq!(joined, 7);
        assert_eq!(manager.state(&id, None).expect("state").players.len(), 8);
    }
}
