use crate::errors::IntoErrorResponse;
use crate::session::{SessionError, SessionManager};
use kazhutha_engine::cards::Card;
use kazhutha_engine::game::GameId;
use kazhutha_engine::snapshot::GameStateView;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    pub player_name: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinGameRequest {
    pub game_id: String,
    pub player_name: String,
}

/// Body shared by host actions and take-hand.
#[derive(Debug, Deserialize)]
pub struct GameActionRequest {
    pub game_id: String,
    pub player_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayCardRequest {
    pub game_id: String,
    pub player_name: String,
    pub card: Card,
}

#[derive(Debug, Default, Deserialize)]
pub struct StateQuery {
    pub player_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateGameResponse {
    pub game_id: GameId,
    pub player_name: String,
}

#[derive(Debug, Serialize)]
pub struct JoinGameResponse {
    pub success: bool,
    pub game_id: GameId,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub rejoined: bool,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameStateView>,
}

impl ActionResponse {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
            game_state: None,
        }
    }
}

/// Creates a new game with the caller as host.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/create`
///
/// # Request Format
/// ```json
/// { "player_name": "alice" }
/// ```
///
/// # Response Format
/// - **Success (201 Created)**: `{ "game_id": "3F9A0C", "player_name": "alice" }`
/// - **Error (400 Bad Request)**: blank player name
pub async fn create_game(sessions: Arc<SessionManager>, request: CreateGameRequest) -> Response {
    match sessions.create_session(&request.player_name) {
        Ok(created) => success_response(
            StatusCode::CREATED,
            CreateGameResponse {
                game_id: created.game_id,
                player_name: created.player_name,
            },
        ),
        Err(err) => session_error(err),
    }
}

/// Joins a lobby, or rejoins a running game as one of its original players.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/join`
///
/// # Response Format
/// - **Success (200 OK)**: `{ "success": true, "game_id": "3F9A0C" }`, with
///   `"rejoined": true` when the game was already running
/// - **Error (404 Not Found)**: unknown game id
/// - **Error (400 Bad Request)**: name taken, lobby full, or rejoin refused
pub async fn join_game(sessions: Arc<SessionManager>, request: JoinGameRequest) -> Response {
    match sessions.join(&request.game_id, &request.player_name) {
        Ok(outcome) => success_response(
            StatusCode::OK,
            JoinGameResponse {
                success: true,
                game_id: outcome.game_id,
                rejoined: outcome.rejoined,
            },
        ),
        Err(err) => session_error(err),
    }
}

/// Deals the cards. Host only (403 otherwise).
pub async fn start_game(sessions: Arc<SessionManager>, request: GameActionRequest) -> Response {
    match sessions.start(&request.game_id, &request.player_name) {
        Ok(()) => success_response(StatusCode::OK, ActionResponse::ok()),
        Err(err) => session_error(err),
    }
}

/// Sends a finished game back to its lobby. Host only.
pub async fn play_again(sessions: Arc<SessionManager>, request: GameActionRequest) -> Response {
    match sessions.play_again(&request.game_id, &request.player_name) {
        Ok(()) => success_response(StatusCode::OK, ActionResponse::ok()),
        Err(err) => session_error(err),
    }
}

/// Plays one card from the caller's hand.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/play`
///
/// # Request Format
/// ```json
/// {
///   "game_id": "3F9A0C",
///   "player_name": "alice",
///   "card": { "suit": "SPADES", "rank": "ACE" }
/// }
/// ```
///
/// # Response Format
/// - **Success (200 OK)**: `{ "success": true, "game_state": { ... } }` with
///   the caller's own view
/// - **Error (400 Bad Request)**: any rule violation, e.g. `not_your_turn`
///   or `must_follow_suit`
pub async fn play_card(sessions: Arc<SessionManager>, request: PlayCardRequest) -> Response {
    match sessions.play_card(&request.game_id, &request.player_name, request.card) {
        Ok(view) => success_response(
            StatusCode::OK,
            ActionResponse {
                success: true,
                message: None,
                game_state: Some(view),
            },
        ),
        Err(err) => session_error(err),
    }
}

pub async fn take_hand(sessions: Arc<SessionManager>, request: GameActionRequest) -> Response {
    match sessions.take_hand(&request.game_id, &request.player_name) {
        Ok((outcome, view)) => success_response(
            StatusCode::OK,
            ActionResponse {
                success: true,
                message: Some(outcome.to_string()),
                game_state: Some(view),
            },
        ),
        Err(err) => session_error(err),
    }
}

/// Snapshot of a game. Only `player_name`'s own hand is included.
pub async fn get_game_state(
    sessions: Arc<SessionManager>,
    game_id: String,
    query: StateQuery,
) -> Response {
    match sessions.state(&game_id, query.player_name.as_deref()) {
        Ok(view) => success_response(StatusCode::OK, view),
        Err(err) => session_error(err),
    }
}

fn success_response<T>(status: StatusCode, body: T) -> Response
where
    T: Serialize,
{
    reply::with_status(reply::json(&body), status).into_response()
}

fn session_error(err: SessionError) -> Response {
    err.into_http_response()
}
