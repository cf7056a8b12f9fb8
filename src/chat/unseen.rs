//! Unseen-message accounting.
//!
//! Counts are derived from the durable `seen` flag: one unseen row is one unit
//! of count, so realtime delivery and poll-based retrieval reconcile by
//! construction and counts survive restarts. The only in-memory state is the
//! actively-viewing map (user → peer whose thread they have open), which
//! decides whether a message is persisted already-seen.

use std::collections::HashMap;

use dashmap::DashMap;
use rusqlite::Connection;

#[derive(Default)]
pub struct UnseenLedger {
    /// user id → peer id whose thread that user is actively viewing.
    /// Set by a history fetch, cleared when the user's last connection drops.
    viewing: DashMap<String, String>,
}

impl UnseenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history fetch for a peer means "viewing that peer now".
    pub fn begin_viewing(&self, user_id: &str, peer_id: &str) {
        self.viewing
            .insert(user_id.to_string(), peer_id.to_string());
    }

    /// Forget what a user was viewing (last connection gone).
    pub fn end_viewing(&self, user_id: &str) {
        self.viewing.remove(user_id);
    }

    /// Is `user_id` actively viewing `peer_id`'s thread?
    pub fn is_viewing(&self, user_id: &str, peer_id: &str) -> bool {
        self.viewing
            .get(user_id)
            .map(|peer| peer.value() == peer_id)
            .unwrap_or(false)
    }

    /// Per-sender unseen counts for a recipient. Senders with no unseen
    /// messages are simply absent (absence ≡ 0).
    pub fn counts_for(
        &self,
        conn: &Connection,
        receiver_id: &str,
    ) -> rusqlite::Result<HashMap<String, u64>> {
        let mut stmt = conn.prepare(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND seen = 0
             GROUP BY sender_id",
        )?;
        let counts = stmt
            .query_map([receiver_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(counts)
    }

    /// Reset the (receiver, peer) pair to zero by flagging that thread seen.
    /// Returns how many messages were newly marked.
    pub fn mark_thread_seen(
        &self,
        conn: &Connection,
        receiver_id: &str,
        peer_id: &str,
    ) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE messages SET seen = 1
             WHERE receiver_id = ?1 AND sender_id = ?2 AND seen = 0",
            [receiver_id, peer_id],
        )
    }
}
