//! Wire events pushed to clients, and the presence broadcaster.
//!
//! Events are JSON text frames shaped `{"event": ..., "data": ...}`, keeping
//! the event names the web client already listens for.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::db::models::MessageRecord;
use crate::ws::{ConnectionRegistry, ConnectionSender};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full roster of online user ids. Always the complete set, never a delta.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<String>),
    /// A newly persisted message, pushed to the recipient's connections.
    #[serde(rename = "newMessage")]
    NewMessage(MessageRecord),
}

impl ServerEvent {
    /// Encode once; callers clone the resulting frame per connection.
    pub fn to_frame(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize WS event");
                None
            }
        }
    }
}

/// Broadcast the current online roster to every registered connection.
/// Called on every presence change (a user's first connect or last disconnect).
/// The roster and recipient list are snapshotted before any send, so each
/// broadcast reflects the registry state at broadcast time.
pub fn broadcast_presence(registry: &ConnectionRegistry) {
    let online = registry.online_user_ids();
    let recipients = registry.all_senders();
    let Some(frame) = ServerEvent::OnlineUsers(online).to_frame() else {
        return;
    };
    for sender in recipients {
        let _ = sender.send(frame.clone());
    }
}

/// Send the current roster to a single connection. Used for a secondary
/// device of an already-online user, whose arrival changes no presence.
pub fn send_presence_snapshot(registry: &ConnectionRegistry, sender: &ConnectionSender) {
    let online = registry.online_user_ids();
    if let Some(frame) = ServerEvent::OnlineUsers(online).to_frame() {
        let _ = sender.send(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn events_serialize_with_client_event_names() {
        let event = ServerEvent::OnlineUsers(vec!["u1".to_string(), "u2".to_string()]);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["event"], "getOnlineUsers");
        assert_eq!(json["data"], serde_json::json!(["u1", "u2"]));

        let message = MessageRecord {
            id: "m1".to_string(),
            sender_id: "u1".to_string(),
            receiver_id: "u2".to_string(),
            text: Some("hi".to_string()),
            image: None,
            seen: false,
            created_at: Utc::now(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&ServerEvent::NewMessage(message)).unwrap())
                .unwrap();
        assert_eq!(json["event"], "newMessage");
        assert_eq!(json["data"]["senderId"], "u1");
        assert_eq!(json["data"]["receiverId"], "u2");
    }
}
