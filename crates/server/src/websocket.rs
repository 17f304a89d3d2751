use axum::body::Bytes;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use cacd_core::notify::Notification;
use cacd_core::ProjectId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AppState;

/// Control messages sent to notification clients; notifications themselves
/// are sent as-is
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Connected { subscription_id: String },
    /// Active filter; `None` means every project
    Subscribed { project_id: Option<ProjectId> },
    Error { message: String },
}

/// Client requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WsRequest {
    SubscribeAll,
    SubscribeProject { project_id: ProjectId },
    Unsubscribe,
}

/// Whether a client filtering on `filter` receives `notification`.
/// Free-text messages and global-scope changes reach everyone.
pub fn wants(filter: Option<ProjectId>, notification: &Notification) -> bool {
    match (filter, notification.project_id()) {
        (None, _) | (_, None) => true,
        (Some(wanted), Some(project)) => wanted == project,
    }
}

/// WebSocket handler for `/api/ws/notify`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket message");
            Ok(())
        }
    }
}

/// Forward hub notifications to one client until either side closes
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.hub.subscribe();
    let mut filter: Option<ProjectId> = None;
    let subscription_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(%subscription_id, "Notification client connected");

    let connected = WsMessage::Connected {
        subscription_id: subscription_id.clone(),
    };
    if send_json(&mut socket, &connected).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            notification = subscription.recv() => {
                let Some(notification) = notification else {
                    tracing::info!(%subscription_id, "Notification hub closed");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                if !wants(filter, &notification) {
                    continue;
                }
                if let Err(e) = send_json(&mut socket, &notification).await {
                    tracing::debug!(%subscription_id, error = %e, "Failed to deliver notification");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<WsRequest>(&text) {
                            Ok(WsRequest::SubscribeAll) => {
                                filter = None;
                                WsMessage::Subscribed { project_id: None }
                            }
                            Ok(WsRequest::SubscribeProject { project_id }) => {
                                tracing::debug!(%subscription_id, %project_id, "Client filtered to project");
                                filter = Some(project_id);
                                WsMessage::Subscribed { project_id: filter }
                            }
                            Ok(WsRequest::Unsubscribe) => {
                                tracing::info!(%subscription_id, "Client unsubscribed");
                                break;
                            }
                            Err(e) => WsMessage::Error {
                                message: format!("invalid request: {}", e),
                            },
                        };
                        if send_json(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        let _ = socket.send(Message::Pong(Bytes::new())).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!(%subscription_id, "WebSocket connection terminated");
}
