use std::sync::Arc;

use crate::chat::unseen::UnseenLedger;
use crate::db::DbPool;
use crate::ws::actor::Heartbeat;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Active WebSocket connections per user
    pub connections: Arc<ConnectionRegistry>,
    /// Unseen-message accounting (viewing map + seen-flag queries)
    pub unseen: Arc<UnseenLedger>,
    /// Ping/pong cadence for connection liveness
    pub heartbeat: Heartbeat,
}

impl AppState {
    pub fn new(db: DbPool, jwt_secret: Vec<u8>) -> Self {
        Self {
            db,
            jwt_secret,
            connections: Arc::new(ConnectionRegistry::new()),
            unseen: Arc::new(UnseenLedger::new()),
            heartbeat: Heartbeat::default(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}
