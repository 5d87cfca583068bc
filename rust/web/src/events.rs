use kazhutha_engine::cards::Card;
use kazhutha_engine::game::GameId;
use kazhutha_engine::snapshot::GameStateView;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

// A subscriber whose buffer fills up is dropped.
const EVENT_CHANNEL_BUFFER: usize = 256;

pub type EventSender = mpsc::Sender<GameEvent>;
pub type EventReceiver = mpsc::Receiver<GameEvent>;

/// A live listener on one game. Dropping it unsubscribes.
pub struct EventSubscription {
    bus: EventBus,
    game_id: GameId,
    subscriber_id: usize,
    player: String,
    pub receiver: EventReceiver,
}

impl EventSubscription {
    pub fn receiver(&mut self) -> &mut EventReceiver {
        &mut self.receiver
    }

    pub fn id(&self) -> usize {
        self.subscriber_id
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn player(&self) -> &str {
        &self.player
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.game_id, self.subscriber_id);
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("game_id", &self.game_id)
            .field("subscriber_id", &self.subscriber_id)
            .field("player", &self.player)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Subscriber {
    id: usize,
    player: String,
    sender: EventSender,
}

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug, Default)]
struct EventBusInner {
    subscribers: RwLock<HashMap<GameId, Vec<Subscriber>>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, game_id: GameId, player: impl Into<String>) -> EventSubscription {
        let player = player.into();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        {
            let mut guard = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            guard.entry(game_id.clone()).or_default().push(Subscriber {
                id,
                player: player.clone(),
                sender: tx,
            });
        }

        tracing::info!(
            game_id = %game_id,
            player = %player,
            subscriber_id = id,
            "client subscribed to game events"
        );

        EventSubscription {
            bus: self.clone(),
            game_id,
            subscriber_id: id,
            player,
            receiver: rx,
        }
    }

    /// Sends every subscriber of `game_id` its own event, built from the
    /// subscriber's player name.
    pub fn broadcast_with<F>(&self, game_id: &str, build: F)
    where
        F: Fn(&str) -> GameEvent,
    {
        let subscribers = self.subscribers_of(game_id);
        if subscribers.is_empty() {
            tracing::debug!(game_id = %game_id, "no subscribers for game");
            return;
        }

        tracing::trace!(
            game_id = %game_id,
            subscriber_count = subscribers.len(),
            "sending event to subscribers"
        );

        let mut failed = Vec::new();
        for subscriber in subscribers {
            let event = build(&subscriber.player);
            tracing::debug!(
                game_id = %game_id,
                player = %subscriber.player,
                event_type = event.kind(),
                "broadcasting game event"
            );
            if let Err(e) = subscriber.sender.try_send(event) {
                tracing::warn!(
                    game_id = %game_id,
                    subscriber_id = subscriber.id,
                    player = %subscriber.player,
                    error = %e,
                    "failed to send event to subscriber"
                );
                failed.push(subscriber.id);
            }
        }
        if !failed.is_empty() {
            self.remove_subscribers(game_id, &failed);
        }
    }

    /// Sends the same event to every subscriber of `game_id`.
    pub fn broadcast(&self, game_id: &str, event: GameEvent) {
        self.broadcast_with(game_id, |_| event.clone());
    }

    /// Delivers one event to a single subscriber. Returns false if it is gone
    /// or could not keep up.
    pub fn send_to(&self, game_id: &str, subscriber_id: usize, event: GameEvent) -> bool {
        let Some(subscriber) = self
            .subscribers_of(game_id)
            .into_iter()
            .find(|s| s.id == subscriber_id)
        else {
            return false;
        };
        match subscriber.sender.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    game_id = %game_id,
                    subscriber_id,
                    error = %e,
                    "failed to send event to subscriber"
                );
                self.remove_subscribers(game_id, &[subscriber_id]);
                false
            }
        }
    }

    pub fn unsubscribe(&self, game_id: &str, subscriber_id: usize) {
        self.remove_subscribers(game_id, &[subscriber_id]);
    }

    pub fn drop_session(&self, game_id: &str) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.remove(game_id);
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.values().map(|list| list.len()).sum()
    }

    /// Number of open streams `player` holds on `game_id`.
    pub fn player_subscriptions(&self, game_id: &str, player: &str) -> usize {
        self.subscribers_of(game_id)
            .iter()
            .filter(|s| s.player == player)
            .count()
    }

    fn subscribers_of(&self, game_id: &str) -> Vec<Subscriber> {
        let guard = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.get(game_id).cloned().unwrap_or_default()
    }

    fn remove_subscribers(&self, game_id: &str, ids: &[usize]) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = guard.get_mut(game_id) {
            list.retain(|s| !ids.contains(&s.id));
            if list.is_empty() {
                guard.remove(game_id);
            }
        }
    }
}

/// Messages pushed to live clients. Most carry the recipient's own view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Connected {
        game_state: GameStateView,
    },
    PlayerJoined {
        player_name: String,
        game_state: GameStateView,
    },
    PlayerReconnected {
        player_name: String,
        game_state: GameStateView,
    },
    GameStarted {
        game_state: GameStateView,
    },
    CardPlayed {
        player: String,
        card: Card,
        game_state: GameStateView,
    },
    HandTaken {
        player: String,
        taken_from: String,
        game_state: GameStateView,
    },
    GameReset {
        game_state: GameStateView,
    },
    PlayerDisconnected {
        player_name: String,
        game_state: GameStateView,
    },
    HostLeft {
        player_name: String,
    },
    GameEnded {
        game_id: GameId,
        reason: String,
    },
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::Connected { .. } => "connected",
            GameEvent::PlayerJoined { .. } => "player_joined",
            GameEvent::PlayerReconnected { .. } => "player_reconnected",
            GameEvent::GameStarted { .. } => "game_started",
            GameEvent::CardPlayed { .. } => "card_played",
            GameEvent::HandTaken { .. } => "hand_taken",
            GameEvent::GameReset { .. } => "game_reset",
            GameEvent::PlayerDisconnected { .. } => "player_disconnected",
            GameEvent::HostLeft { .. } => "host_left",
            GameEvent::GameEnded { .. } => "game_ended",
        }
    }

    pub fn game_state(&self) -> Option<&GameStateView> {
        match self {
            GameEvent::Connected { game_state }
            | GameEvent::PlayerJoined { game_state, .. }
            | GameEvent::PlayerReconnected { game_state, .. }
            | GameEvent::GameStarted { game_state }
            | GameEvent::CardPlayed { game_state, .. }
            | GameEvent::HandTaken { game_state, .. }
            | GameEvent::GameReset { game_state }
            | GameEvent::PlayerDisconnected { game_state, .. } => Some(game_state),
            GameEvent::HostLeft { .. } | GameEvent::GameEnded { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ended(game_id: &str) -> GameEvent {
        GameEvent::GameEnded {
            game_id: game_id.to_string(),
            reason: "test".into(),
        }
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let bus = EventBus::new();
        {
            let _sub = bus.subscribe("G1".into(), "ann");
            assert_eq!(bus.subscriber_count(), 1);
            assert_eq!(bus.player_subscriptions("G1", "ann"), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.player_subscriptions("G1", "ann"), 0);
    }

    #[test]
    fn broadcast_with_builds_one_event_per_recipient() {
        let bus = EventBus::new();
        let mut ann = bus.subscribe("G1".into(), "ann");
        let mut bob = bus.subscribe("G1".into(), "bob");

        bus.broadcast_with("G1", |player| GameEvent::HostLeft {
            player_name: player.to_string(),
        });

        assert_eq!(
            ann.receiver.try_recv().expect("ann event"),
            GameEvent::HostLeft {
                player_name: "ann".into()
            }
        );
        assert_eq!(
            bob.receiver.try_recv().expect("bob event"),
            GameEvent::HostLeft {
                player_name: "bob".into()
            }
        );
    }

    #[test]
    fn events_stay_within_their_game() {
        let bus = EventBus::new();
        let mut here = bus.subscribe("G1".into(), "ann");
        let mut there = bus.subscribe("G2".into(), "ann");

        bus.broadcast("G1", ended("G1"));

        assert!(here.receiver.try_recv().is_ok());
        assert!(there.receiver.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_is_pruned() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("G1".into(), "ann");
        sub.receiver.close();

        bus.broadcast("G1", ended("G1"));
        assert_eq!(bus.subscriber_count(), 0);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn full_buffer_drops_the_slow_subscriber() {
        let bus = EventBus::new();
        let _slow = bus.subscribe("G1".into(), "ann");
        for _ in 0..EVENT_CHANNEL_BUFFER {
            bus.broadcast("G1", ended("G1"));
        }
        assert_eq!(bus.subscriber_count(), 1);

        bus.broadcast("G1", ended("G1"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn send_to_targets_one_subscriber() {
        let bus = EventBus::new();
        let mut first = bus.subscribe("G1".into(), "ann");
        let mut second = bus.subscribe("G1".into(), "ann");

        assert!(bus.send_to("G1", second.id(), ended("G1")));
        assert!(first.receiver.try_recv().is_err());
        assert!(second.receiver.try_recv().is_ok());
        assert!(!bus.send_to("G1", 9_999, ended("G1")));
    }

    #[test]
    fn event_tags_are_snake_case() {
        let json = serde_json::to_value(GameEvent::HostLeft {
            player_name: "ann".into(),
        })
        .expect("serialize");
        assert_eq!(json["type"], "host_left");
        assert_eq!(json["player_name"], "ann");
        assert_eq!(
            GameEvent::HostLeft {
                player_name: "ann".into()
            }
            .kind(),
            "host_left"
        );
    }
}
