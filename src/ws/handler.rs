//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{Action, ActionKind, PlayerId};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{decode_intent, encode, ServerMsg};

type WsSink = futures::stream::SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler. Every connection is a new player.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, player_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: PlayerId, state: AppState) {
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    let sent = match welcome.encode() {
        Ok(text) => ws_sink.send(Message::Text(text)).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = sent {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    state.open_connection(player_id);

    // Subscribe before reading so nothing caused by our own intents is missed
    let replicated = state.replication.subscribe();
    let writer = tokio::spawn(write_loop(player_id, ws_sink, replicated));

    read_loop(player_id, ws_stream, &state).await;

    // Normalize every kind of close into one intent
    let disconnect = Action::client(ActionKind::DisconnectionRequested { player_id });
    if let Err(e) = state.bus.dispatch(disconnect).await {
        warn!(player_id = %player_id, error = %e, "Could not report disconnection");
    }

    writer.abort();
    state.close_connection(&player_id);

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Client frames -> action bus
async fn read_loop(
    player_id: PlayerId,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::with_rate(state.config.intent_rate_limit);

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_intent() {
                    debug!(player_id = %player_id, "Rate limited intent");
                    continue;
                }

                match decode_intent(&text, player_id) {
                    Ok(Some(action)) => {
                        if state.bus.dispatch(action).await.is_err() {
                            debug!(player_id = %player_id, "Action bus closed");
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(player_id = %player_id, "Ignoring unknown frame type");
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client frame");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Replicated actions -> client, filtered by each action's directive
async fn write_loop(
    player_id: PlayerId,
    mut ws_sink: WsSink,
    mut replicated: broadcast::Receiver<Action>,
) {
    loop {
        match replicated.recv().await {
            Ok(action) => {
                if !action.delivers_to(player_id) {
                    continue;
                }
                let text = match encode(&action) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(action = action.type_name(), error = %e, "Failed to encode action");
                        continue;
                    }
                };
                if let Err(e) = ws_sink.send(Message::Text(text)).await {
                    debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(player_id = %player_id, lagged_count = n, "Client lagged, skipped {} actions", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(player_id = %player_id, "Replication channel closed");
                break;
            }
        }
    }
}
