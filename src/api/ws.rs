//! WebSocket push endpoint.
//!
//! One subscriber per connection. The hub queues `initialData` first, then
//! every `sampleUpdate` / `priceUpdate`. Each socket write is bounded by the
//! configured send timeout; a failed or slow write ends the connection.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::fmt::Display;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::AppState;
use crate::fanout::SubscriberId;

/// WebSocket handler for real-time gas and price streaming
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    serve_subscriber(sender, receiver, state).await;
}

/// Pump hub events out and client frames in until either side goes away.
/// The subscriber is always unregistered on return.
pub async fn serve_subscriber<Tx, Rx, E>(mut sender: Tx, mut receiver: Rx, state: AppState)
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut subscription = state.hub.subscribe();
    let id = subscription.id();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!(subscriber = id, "Hub dropped subscriber, closing socket");
                    break;
                };
                let text = match serde_json::to_string(event.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(subscriber = id, error = %e, "Failed to serialize ws event");
                        continue;
                    }
                };
                if !send_bounded(&mut sender, text, state.ws_send_timeout, id, event.kind()).await {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = client_reply(&text) {
                            if !send_bounded(&mut sender, reply, state.ws_send_timeout, id, "pong").await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(subscriber = id, error = %e, "Socket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.hub.unsubscribe(id);
}

/// Send one text frame within `limit`. Returns `false` when the socket
/// failed or stalled and the connection should end.
async fn send_bounded<Tx>(
    sender: &mut Tx,
    text: String,
    limit: Duration,
    id: SubscriberId,
    kind: &str,
) -> bool
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
{
    match timeout(limit, sender.send(Message::Text(text))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(subscriber = id, error = %e, "Socket send failed");
            false
        }
        Err(_) => {
            warn!(subscriber = id, kind, "Socket send timed out, dropping subscriber");
            false
        }
    }
}

/// Reply to a client frame. Only `ping` is answered; anything else is
/// ignored with a warning.
pub fn client_reply(text: &str) -> Option<String> {
    if text.trim() == "ping" {
        return Some("pong".to_string());
    }

    let Ok(json) = serde_json::from_str::<Value>(text) else {
        warn!("Ignoring non-JSON client message");
        return None;
    };

    match json.get("type").and_then(|t| t.as_str()) {
        Some("ping") => {
            // Echo the timestamp so the client can measure round trips
            let timestamp = json
                .get("data")
                .and_then(|d| d.get("timestamp"))
                .and_then(|t| t.as_i64())
                .unwrap_or(0);
            Some(
                serde_json::json!({
                    "type": "pong",
                    "data": { "timestamp": timestamp }
                })
                .to_string(),
            )
        }
        Some(kind) => {
            warn!(kind, "Ignoring unknown client message kind");
            None
        }
        None => {
            warn!("Ignoring client message without a type");
            None
        }
    }
}
