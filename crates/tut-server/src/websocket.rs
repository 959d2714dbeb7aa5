//! WebSocket endpoint for live reload.
//!
//! Each connection registers with the [`Hub`] and forwards its messages to the
//! browser until either side goes away.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::time::{Instant, interval_at, sleep, timeout};
use tracing::debug;

use crate::hub::Hub;
use crate::state::AppState;

/// Largest message accepted from a browser.
pub(crate) const MAX_MESSAGE_SIZE: usize = 512;
/// Time allowed to write one message.
pub(crate) const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Time allowed between two frames from the browser.
pub(crate) const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping interval, shorter than [`PONG_WAIT`].
pub(crate) const PING_PERIOD: Duration = Duration::from_secs(54);

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn send_bounded(socket: &mut WebSocket, message: Message) -> bool {
    matches!(timeout(WRITE_WAIT, socket.send(message)).await, Ok(Ok(())))
}

async fn handle_socket(mut socket: WebSocket, hub: Hub) {
    let Ok(mut client) = hub.connect() else {
        let _ = send_bounded(&mut socket, Message::Close(None)).await;
        return;
    };
    let id = client.id();

    let mut ping = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    let deadline = sleep(PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            message = client.recv() => {
                let Some(text) = message else {
                    // Dropped by the hub
                    let _ = send_bounded(&mut socket, Message::Close(None)).await;
                    break;
                };
                if !send_bounded(&mut socket, Message::Text(text.into())).await {
                    break;
                }
            }
            _ = ping.tick() => {
                if !send_bounded(&mut socket, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => deadline.as_mut().reset(Instant::now() + PONG_WAIT),
                }
            }
            () = &mut deadline => {
                debug!(client = ?id, "Live-reload client timed out");
                break;
            }
        }
    }
    debug!(client = ?id, "Live-reload connection closed");
}
