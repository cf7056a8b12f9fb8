pub mod actor;
pub mod events;
pub mod handler;
pub mod registry;

use tokio::sync::mpsc;

/// Sender half of a WebSocket connection's outbound channel.
/// Other parts of the system clone this to push frames to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

pub use registry::{ConnectionHandle, ConnectionRegistry};
