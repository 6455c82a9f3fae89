//! WebSocket connection handler.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::StreamExt;

use crate::client::{self, Client, MAX_MESSAGE_SIZE, PumpTimings};
use crate::hub::HubHandle;

use super::state::AppState;

/// Accept a WebSocket upgrade on `/ws`.
///
/// The request must carry exactly one non-empty `nickname` query value;
/// anything else is rejected with 400 before the upgrade is attempted.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(nickname) = extract_nickname(&params) else {
        tracing::warn!("rejecting connection without a single nickname value");
        return Err(StatusCode::BAD_REQUEST);
    };

    let hub = state.hub.clone();
    let timings = state.timings;

    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, hub, nickname, timings)))
}

/// Register the client with the hub and run its pump pair.
async fn handle_socket(socket: WebSocket, hub: HubHandle, nickname: String, timings: PumpTimings) {
    let (client, mailbox_rx) = Client::new(nickname.clone());
    let id = client.id;

    if hub.register(client).await.is_err() {
        tracing::error!("hub is gone, dropping connection for '{}'", nickname);
        return;
    }
    tracing::info!("client '{}' connected", nickname);

    let (sink, stream) = socket.split();
    tokio::spawn(client::write_pump(sink, mailbox_rx, timings));
    client::read_pump(stream, hub, nickname, id, timings).await;
}

/// Pull the nickname out of the query pairs. Exactly one non-empty value
/// is required.
fn extract_nickname(params: &[(String, String)]) -> Option<String> {
    let mut values = params
        .iter()
        .filter(|(key, _)| key == "nickname")
        .map(|(_, value)| value);

    let nickname = values.next()?;
    if values.next().is_some() || nickname.is_empty() {
        return None;
    }

    Some(nickname.clone())
}
