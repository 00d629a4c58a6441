//! WebSocket handler for real-time updates

use automation_engine::{ActionFired, AutomationEvent};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    ActionFired { fired: ActionFired },
    Engine { event: AutomationEvent },
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Ok(connected_msg) = serde_json::to_string(&WsEvent::Connected) else {
        return;
    };
    if sender.send(Message::Text(connected_msg)).await.is_err() {
        return;
    }

    let mut action_rx = state.engine.subscribe_actions();
    let mut event_rx = state.engine.subscribe();

    // Forward engine activity to the client
    let send_task = tokio::spawn(async move {
        loop {
            let ws_event = tokio::select! {
                fired = action_rx.recv() => match fired {
                    Ok(fired) => WsEvent::ActionFired { fired },
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket client lagged by {} actions", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                event = event_rx.recv() => match event {
                    Ok(event) => WsEvent::Engine { event },
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket client lagged by {} events", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let Ok(json) = serde_json::to_string(&ws_event) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Incoming messages are ignored until the client closes
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}
