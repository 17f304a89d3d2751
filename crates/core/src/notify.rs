// Notification hub shared by the WebSocket and GraphQL subscription surfaces

use crate::types::{Entity, EntityKind, ProjectId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// How an entity changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Free-text notice for connected clients
    Message { text: String, at: DateTime<Utc> },
    EntityChanged {
        kind: EntityKind,
        project_id: Option<ProjectId>,
        change: ChangeKind,
        id: serde_json::Value,
        /// Current value; absent for deletions
        record: Option<serde_json::Value>,
    },
}

impl Notification {
    pub fn message(text: impl Into<String>) -> Self {
        Notification::Message {
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        match self {
            Notification::Message { .. } => None,
            Notification::EntityChanged { project_id, .. } => *project_id,
        }
    }
}

/// Single publisher of server notifications.
///
/// Created once at startup and held by the server state. `shutdown` ends every
/// open subscription; publishing after shutdown is a no-op.
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
    shutdown: CancellationToken,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            shutdown: CancellationToken::new(),
        }
    }

    /// Publish to all current subscribers; returns how many received it
    pub fn publish(&self, notification: Notification) -> usize {
        if self.shutdown.is_cancelled() {
            return 0;
        }
        match self.sender.send(notification) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("Notification dropped, no subscribers");
                0
            }
        }
    }

    pub fn message(&self, text: impl Into<String>) -> usize {
        self.publish(Notification::message(text))
    }

    pub fn entity_changed<E: Entity>(&self, change: ChangeKind, entity: &E) -> usize {
        let record = serde_json::to_value(entity).ok();
        self.publish(Notification::EntityChanged {
            kind: E::KIND,
            project_id: entity.scope(),
            change,
            id: entity.id_value(),
            record,
        })
    }

    pub fn entity_deleted(
        &self,
        kind: EntityKind,
        project_id: Option<ProjectId>,
        id: serde_json::Value,
    ) -> usize {
        self.publish(Notification::EntityChanged {
            kind,
            project_id,
            change: ChangeKind::Deleted,
            id,
            record: None,
        })
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Token cancelled when the hub shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        tracing::info!(
            subscribers = self.sender.receiver_count(),
            "Notification hub shutting down"
        );
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving end of the hub
pub struct Subscription {
    receiver: broadcast::Receiver<Notification>,
    shutdown: CancellationToken,
}

impl Subscription {
    /// Next notification, or `None` once the hub has shut down
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                received = self.receiver.recv() => match received {
                    Ok(notification) => return Some(notification),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Subscriber lagged, notifications skipped");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}
