use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::quiz::{QuizServer, QuizSignalingHandler};

pub async fn handle_quiz_websocket(
    websocket: WebSocket,
    server: Arc<QuizServer>,
    token: Option<String>,
) {
    tracing::info!("New quiz WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Spawn task to send messages to client
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    // The handshake fails closed: no token, or a token that does not
    // resolve, closes the socket without an explanation on the wire.
    let handler = match token {
        Some(token) => QuizSignalingHandler::connect(server, &token, tx).await,
        None => {
            tracing::warn!("WebSocket upgrade without a session token");
            sender_task.abort();
            return;
        }
    };
    let handler = match handler {
        Ok(handler) => handler,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake rejected");
            sender_task.abort();
            return;
        }
    };

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => {
                if message.is_close() {
                    break;
                }
                if let Ok(text) = message.to_str() {
                    tracing::debug!(conn_id = handler.conn_id(), "Received quiz message: {}", text);
                    handler.handle_text(text).await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    handler.cleanup().await;
    sender_task.abort();
    tracing::info!(conn_id = handler.conn_id(), "Quiz WebSocket connection closed");
}
