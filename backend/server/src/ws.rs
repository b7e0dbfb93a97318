use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::session::Session;

pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Everything bound for the client goes through here: session events and sync replies.
    let (tx, mut rx) = mpsc::channel::<String>(256);

    let mut events = state.session.subscribe();
    let events_tx = tx.clone();
    let events_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(msg) => {
                    if events_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("WebSocket client lagged, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let session = state.session.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Text(text) = msg {
                handle_client_message(&text, &session, &tx).await;
            }
        }
    });

    tokio::select! {
        _ = events_task => {},
        _ = send_task => {},
        _ = recv_task => {},
    }
}

async fn handle_client_message(text: &str, session: &Arc<Session>, sender: &mpsc::Sender<String>) {
    let msg: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    if msg.get("type").and_then(|t| t.as_str()) == Some("sync") {
        let snapshot = session.snapshot().await;
        let reply = serde_json::json!({ "type": "state", "state": snapshot });
        let _ = sender.send(reply.to_string()).await;
    }
}
