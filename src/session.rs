//! Client-side session reducer.
//!
//! A pure state machine that merges REST-fetched history with pushed live
//! events into one ordered, de-duplicated timeline per open conversation.
//! It performs no I/O — the embedding client feeds it [`SessionEvent`]s and
//! renders from its accessors, which makes every transition testable with
//! synthetic events.
//!
//! Reconciliation rules:
//! - a history fetch replaces the view wholesale (no merge, no sequence
//!   numbers to track);
//! - a push appends only while its conversation's thread is open, and only
//!   once per message id;
//! - a send appends only after the server confirms the durable write.

use std::collections::HashSet;

use crate::db::models::MessageRecord;

/// Connection lifecycle phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
}

/// Inputs to the reducer: transport lifecycle, fetch results, pushed events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectStarted,
    ConnectSucceeded,
    /// Transport loss. The view is retained; the client re-fetches history
    /// for the selected peer after reconnecting.
    ConnectionLost,
    /// Full online roster from a presence broadcast.
    PresenceChanged(Vec<String>),
    /// History fetch for a peer completed; opens that peer's thread.
    HistoryLoaded {
        peer_id: String,
        messages: Vec<MessageRecord>,
    },
    /// History fetch failed; the view must not show stale or partial state.
    HistoryFailed,
    /// A `newMessage` push arrived.
    MessagePushed(MessageRecord),
    /// The durable-write endpoint confirmed a sent message.
    SendConfirmed(MessageRecord),
}

/// Ordered, de-duplicated message list for the open conversation.
/// Order is non-decreasing by creation time, ties broken by id.
#[derive(Debug, Default)]
pub struct ConversationView {
    messages: Vec<MessageRecord>,
    ids: HashSet<String>,
}

impl ConversationView {
    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.contains(message_id)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn replace(&mut self, mut messages: Vec<MessageRecord>) {
        messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        self.messages.clear();
        self.ids.clear();
        for message in messages {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
    }

    /// Insert keeping order; duplicates (by id) are dropped.
    fn append(&mut self, message: MessageRecord) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        let pos = self
            .messages
            .iter()
            .rposition(|m| m.created_at <= message.created_at)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.messages.insert(pos, message);
        true
    }

    fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}

/// Per-client session state: connection phase, selected peer, open view,
/// and the last seen online roster.
#[derive(Debug)]
pub struct Session {
    auth_user_id: String,
    phase: Phase,
    selected_peer: Option<String>,
    view: ConversationView,
    online: HashSet<String>,
}

impl Session {
    pub fn new(auth_user_id: impl Into<String>) -> Self {
        Self {
            auth_user_id: auth_user_id.into(),
            phase: Phase::Disconnected,
            selected_peer: None,
            view: ConversationView::default(),
            online: HashSet::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn selected_peer(&self) -> Option<&str> {
        self.selected_peer.as_deref()
    }

    pub fn view(&self) -> &ConversationView {
        &self.view
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    /// Apply one event. Transitions are total: events that do not apply in
    /// the current state are dropped rather than rejected.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ConnectStarted => {
                self.phase = Phase::Connecting;
            }
            SessionEvent::ConnectSucceeded => {
                self.phase = Phase::Connected;
            }
            SessionEvent::ConnectionLost => {
                // View retained in memory; roster is stale, so drop it
                self.phase = Phase::Disconnected;
                self.online.clear();
            }
            SessionEvent::PresenceChanged(online) => {
                self.online = online.into_iter().collect();
            }
            SessionEvent::HistoryLoaded { peer_id, messages } => {
                self.selected_peer = Some(peer_id);
                self.view.replace(messages);
            }
            SessionEvent::HistoryFailed => {
                // Empty beats stale or partial
                self.view.clear();
            }
            SessionEvent::MessagePushed(message) => {
                if self.thread_matches(&message) {
                    self.view.append(message);
                }
                // Otherwise dropped from the view; the server-side unseen
                // count covers it until the thread is opened.
            }
            SessionEvent::SendConfirmed(message) => {
                if self.thread_matches(&message) {
                    self.view.append(message);
                }
            }
        }
    }

    /// A message belongs in the open view only if it travels between the
    /// authenticated user and the selected peer, in either direction.
    fn thread_matches(&self, message: &MessageRecord) -> bool {
        match &self.selected_peer {
            Some(peer) => message.is_between(&self.auth_user_id, peer),
            None => false,
        }
    }
}
