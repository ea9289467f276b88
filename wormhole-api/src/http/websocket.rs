//! WebSocket handler
//!
//! Each connection is one subscriber. Values queued for the subscriber are
//! forwarded as JSON text frames by a dedicated writer task; the reader loop
//! turns `write` frames into hub writes. Whichever side ends first, the
//! subscriber is unregistered and the other side winds down.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wormhole_core::models::SubscriberId;
use wormhole_core::SyncHub;

use crate::http::AppState;
use crate::protocol::{ClientMessage, ServerMessage};

/// Frames carry one short value; the 64MB default is excessive
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Error replies waiting for the writer task
const REPLY_BUFFER: usize = 8;

/// WebSocket handler for real-time value updates
///
/// <ws://host/ws>
pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.hub.on_client_connect();
    let subscriber_id = subscription.id().clone();

    info!(
        subscriber_id = %subscriber_id,
        version = subscription.snapshot().version,
        "WebSocket connection established"
    );

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(REPLY_BUFFER);

    // Server messages -> WebSocket. Owns the subscription, so it is dropped
    // (and unregistered) when this task ends.
    let writer_id = subscriber_id.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                value = subscription.recv() => match value {
                    Some(value) => ServerMessage::from(&value),
                    None => break,
                },
                Some(reply) = reply_rx.recv() => reply,
            };

            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    error!(subscriber_id = %writer_id, error = %e, "Failed to encode server message");
                    continue;
                }
            };

            if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                warn!(subscriber_id = %writer_id, error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    // WebSocket -> hub
    let reader = async {
        while let Some(frame) = ws_stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_client_frame(&state.hub, &subscriber_id, text.as_str(), &reply_tx);
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {
                    // Ignore binary, ping and pong frames
                }
                Err(e) => {
                    debug!(subscriber_id = %subscriber_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    };

    let writer_finished = tokio::select! {
        () = reader => false,
        _ = &mut writer => true,
    };

    // Closes the subscriber queue, which ends the writer loop
    state.hub.on_client_disconnect(&subscriber_id);
    if !writer_finished {
        if let Err(e) = writer.await {
            error!(subscriber_id = %subscriber_id, error = %e, "WebSocket writer task failed");
        }
    }

    info!(subscriber_id = %subscriber_id, "WebSocket connection closed");
}

fn handle_client_frame(
    hub: &SyncHub,
    subscriber_id: &SubscriberId,
    text: &str,
    reply_tx: &mpsc::Sender<ServerMessage>,
) {
    match ClientMessage::decode(text) {
        Ok(ClientMessage::Write { content }) => {
            let value = hub.on_client_write(content);
            debug!(subscriber_id = %subscriber_id, version = value.version, "Client write applied");
        }
        Err(e) => {
            warn!(subscriber_id = %subscriber_id, error = %e, "Ignoring undecodable frame");
            let reply = ServerMessage::Error {
                message: e.to_string(),
            };
            if reply_tx.try_send(reply).is_err() {
                debug!(subscriber_id = %subscriber_id, "Dropping error reply, writer is busy or gone");
            }
        }
    }
}
