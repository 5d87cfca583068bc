use crate::errors::IntoErrorResponse;
use crate::events::GameEvent;
use crate::session::{PlayerConnection, SessionManager};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use warp::http;
use warp::reply::{self, Response};
use warp::sse;
use warp::Reply;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub player_name: String,
}

/// `GET /api/game/{id}/events?player_name=..`
///
/// Server-sent event stream of one player's view of a game. The stream
/// owns the player's connection; when the client goes away and the player
/// has no other stream open, the player is disconnected from the game.
pub async fn stream_events(
    game_id: String,
    query: EventsQuery,
    sessions: Arc<SessionManager>,
    keep_alive: Duration,
) -> Response {
    let connection = match sessions.connect(&game_id, &query.player_name) {
        Ok(connection) => connection,
        Err(err) => return err.into_http_response(),
    };

    let stream = connection_stream(connection);
    let keep_alive = sse::keep_alive().interval(keep_alive).text(":keep-alive\n");

    let reply = sse::reply(keep_alive.stream(stream));
    reply::with_header(reply, http::header::CACHE_CONTROL, "no-cache").into_response()
}

fn connection_stream(
    connection: PlayerConnection,
) -> impl tokio_stream::Stream<Item = Result<sse::Event, Infallible>> {
    let mut connection = connection;
    let (_, placeholder_rx) = mpsc::channel(1);
    let receiver = match connection.subscription_mut() {
        Some(subscription) => std::mem::replace(&mut subscription.receiver, placeholder_rx),
        None => placeholder_rx,
    };
    let connection = Arc::new(connection);

    ReceiverStream::new(receiver).map(move |event| {
        let _keep_alive = Arc::clone(&connection);
        Ok(render_event(event))
    })
}

fn render_event(event: GameEvent) -> sse::Event {
    match serde_json::to_string(&event) {
        Ok(json) => sse::Event::default().event("game_event").data(json),
        Err(err) => {
            let fallback = serde_json::json!({
                "type": "error",
                "message": format!("failed to serialize game event: {err}")
            })
            .to_string();
            sse::Event::default().event("game_event").data(fallback)
        }
    }
}
