use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::events;
use crate::ws::registry::ConnectionHandle;

/// Ping interval: server sends a WebSocket ping every 30 seconds.
/// Crashed tabs that never send a close frame are reaped by the pong timeout,
/// so the registry does not accumulate stale connections.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if no pong arrives within 10 seconds after a ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Heartbeat cadence for a connection actor. Carried on [`AppState`] so tests
/// can run the liveness path at millisecond scale.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
        }
    }
}

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from an mpsc channel
/// - Reader task: consumes incoming frames and heartbeats
///
/// The mpsc sender is what the registry hands out; the relay and the presence
/// broadcaster clone it to push events to this client. Chat traffic is
/// server→client only — sends go through the durable REST endpoint.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = ConnectionHandle::new(tx.clone());
    let connection_id = handle.id;

    // Registry mutation and the presence decision happen before any I/O.
    let came_online = state.connections.register(&user_id, handle);
    if came_online {
        events::broadcast_presence(&state.connections);
    } else {
        // Secondary device: presence unchanged, but it still needs the roster.
        events::send_presence_snapshot(&state.connections, &tx);
    }

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket actor started"
    );

    // Writer task: forwards mpsc frames to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Fired by the ping task when the heartbeat declares the peer dead, so the
    // reader does not sit on a half-open TCP stream until retransmission gives
    // up. Unregistration must follow the pong timeout, not the TCP timeout.
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    // Ping task: periodic pings, closes the connection on pong timeout
    let heartbeat = state.heartbeat;
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(heartbeat.ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(heartbeat.pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    let _ = shutdown_tx.send(());
                    break;
                }
            }
        }
    });

    // Reader loop. The shutdown branch also resolves when the ping task exits
    // without firing (sender dropped), which only happens once the writer is
    // already gone.
    loop {
        let incoming = tokio::select! {
            _ = &mut shutdown_rx => break,
            incoming = ws_receiver.next() => incoming,
        };
        match incoming {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    // No client→server chat traffic on this channel
                    tracing::debug!(
                        user_id = %user_id,
                        "Ignoring client text frame: {}",
                        text.chars().take(100).collect::<String>()
                    );
                }
                Message::Binary(_) => {
                    tracing::debug!(user_id = %user_id, "Ignoring client binary frame");
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    // Error and close paths both land here, but unregister is keyed by the
    // handle id so the second signal is a no-op and presence fires once.
    let went_offline = state.connections.unregister(&user_id, connection_id);
    if went_offline {
        state.unseen.end_viewing(&user_id);
        events::broadcast_presence(&state.connections);
    }

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives frames from the mpsc channel and forwards them to the sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
