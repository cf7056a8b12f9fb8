//! Best-effort realtime delivery of durably committed messages.
//!
//! The relay is not the durability path: it runs only after the insert has
//! committed, and a failed push is merely a missed notification — the message
//! is still retrieved on the recipient's next history fetch.

use crate::db::models::MessageRecord;
use crate::ws::events::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Push a committed message to every live connection of its recipient
/// (multi-device fan-out). Exactly one push per connection; failures are
/// swallowed and never retried or surfaced to the sender.
pub fn push_to_receiver(registry: &ConnectionRegistry, message: &MessageRecord) {
    let senders = registry.connections_for(&message.receiver_id);
    if senders.is_empty() {
        // Recipient offline — they will catch up via history retrieval
        return;
    }

    let Some(frame) = ServerEvent::NewMessage(message.clone()).to_frame() else {
        return;
    };

    for sender in &senders {
        if sender.send(frame.clone()).is_err() {
            tracing::debug!(
                message_id = %message.id,
                receiver_id = %message.receiver_id,
                "Realtime push failed, recipient will catch up on next fetch"
            );
        }
    }
}
