//! WebSocket handler
//!
//! Binds the socket lifecycle to the router: open, frame, error and close.

use crate::server::GatewayState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use relay_core::{ChannelTransport, OutboundFrame};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// WebSocket upgrade handler
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(state, socket))
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, socket: WebSocket) {
    let transport_key = format!("ws_{}", Uuid::new_v4().simple());

    // Frames queued by the router are drained by the send task
    let (transport, mut rx) =
        ChannelTransport::new(transport_key.clone(), state.config().router.outbound_buffer);
    let connection = state.router().on_connect(Box::new(transport));
    let connection_id = connection.id().to_string();
    drop(connection);

    let (mut ws_sink, mut ws_stream) = socket.split();

    let id_send = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if ws_sink.send(Message::Text(text.into())).await.is_err() {
                        tracing::warn!(connection_id = %id_send, "Failed to send message to WebSocket");
                        break;
                    }
                }
                OutboundFrame::Close => break,
            }
        }

        // Close the WebSocket when the channel is closed
        let _ = ws_sink.close().await;
    });

    let router = Arc::clone(state.router());
    let key_recv = transport_key.clone();
    let id_recv = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_stream.next().await {
            match msg {
                Ok(Message::Text(text)) => route_frame(&router, &key_recv, &text),
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => route_frame(&router, &key_recv, text),
                    Err(_) => {
                        tracing::debug!(connection_id = %id_recv, "Ignoring non UTF-8 binary frame");
                    }
                },
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    tracing::trace!(connection_id = %id_recv, "Ping/pong received");
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %id_recv, "Client closed connection");
                    break;
                }
                Err(e) => {
                    router.on_error(&key_recv, &e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task ended");
            stop_task(send_task).await;
        }
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task ended");
            // A frame being routed must finish before the connection is torn down
            stop_task(recv_task).await;
        }
    }

    state.router().on_disconnect(&transport_key);
}

/// Abort `task` and wait until it has actually stopped
///
/// Synchronous work already in progress runs to its next await point first.
async fn stop_task(task: JoinHandle<()>) {
    task.abort();
    if let Err(e) = task.await {
        if !e.is_cancelled() {
            tracing::warn!(error = %e, "Socket task panicked");
        }
    }
}

fn route_frame(router: &relay_core::MessageRouter, transport_key: &str, text: &str) {
    match router.on_message(transport_key, text) {
        Ok(outcome) => tracing::trace!(transport_key, ?outcome, "Frame routed"),
        // Already reported to the peer
        Err(e) => tracing::trace!(transport_key, error = %e, "Frame rejected"),
    }
}
