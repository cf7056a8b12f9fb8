//! Connection registry: the source of truth for "who is online".
//!
//! Maps user id → live connection handles. A user can have multiple concurrent
//! connections (tabs, devices). All access goes through this API; nothing else
//! touches the underlying map. Mutations are serialized per user by the shard
//! lock held for the duration of the (synchronous, await-free) update, so
//! connect/disconnect races cannot lose updates.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::ConnectionSender;

/// One live connection. Owned by the registry for its lifetime; the actor that
/// created it holds only the id for later unregistration.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub sender: ConnectionSender,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender,
            connected_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    entries: DashMap<String, Vec<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a user's set. Idempotent per handle id.
    /// Returns true if the user transitioned offline → online (presence changed).
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) -> bool {
        let mut entry = self.entries.entry(user_id.to_string()).or_default();
        if entry.iter().any(|existing| existing.id == handle.id) {
            return false;
        }
        let came_online = entry.is_empty();
        entry.push(handle);
        came_online
    }

    /// Remove a connection from a user's set. Tolerates duplicate disconnect
    /// signals: removing an unknown connection is a no-op.
    /// Returns true if the user's set became empty (presence changed).
    pub fn unregister(&self, user_id: &str, connection_id: Uuid) -> bool {
        let went_offline = match self.entries.get_mut(user_id) {
            Some(mut entry) => {
                let had_connections = !entry.is_empty();
                entry.retain(|handle| handle.id != connection_id);
                had_connections && entry.is_empty()
            }
            None => false,
        };

        if went_offline {
            // Guard re-checks emptiness: a concurrent register between the
            // retain above and this call keeps the entry alive.
            self.entries.remove_if(user_id, |_, handles| handles.is_empty());
        }
        went_offline
    }

    /// Snapshot of all user ids holding at least one live connection.
    pub fn online_user_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.entries
            .get(user_id)
            .map(|entry| !entry.value().is_empty())
            .unwrap_or(false)
    }

    /// Cloned senders for one user's connections. Cloning lets callers push
    /// frames after the shard lock is released.
    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionSender> {
        self.entries
            .get(user_id)
            .map(|entry| entry.value().iter().map(|h| h.sender.clone()).collect())
            .unwrap_or_default()
    }

    /// Cloned senders for every registered connection, for roster broadcasts.
    pub fn all_senders(&self) -> Vec<ConnectionSender> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .map(|h| h.sender.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
