pub mod game;
pub mod health;
pub mod sse;

pub use game::{
    create_game, get_game_state, join_game, play_again, play_card, start_game, take_hand,
    CreateGameRequest, GameActionRequest, JoinGameRequest, PlayCardRequest, StateQuery,
};
pub use health::health;
pub use sse::{stream_events, EventsQuery};
