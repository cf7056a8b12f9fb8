//! REST endpoints for contacts, conversation history, and sending messages.
//!
//! Durability ordering is the contract here: a message is inserted first, and
//! only a committed insert reaches the relay. A store failure surfaces to the
//! sender as an error response and nothing is pushed or counted.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::chat::relay;
use crate::db::models::{MessageRecord, PublicUser, MESSAGE_COLUMNS, PUBLIC_USER_COLUMNS};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactsResponse {
    pub users: Vec<PublicUser>,
    /// sender id → count of messages not yet viewed, for unread badges
    pub unseen_messages: HashMap<String, u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// Ascending by creation time
    pub messages: Vec<MessageRecord>,
    pub unseen_messages: HashMap<String, u64>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    pub image: Option<String>,
}

/// GET /api/messages/users — contact list plus unseen counts.
pub async fn get_contacts(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<ContactsResponse>, StatusCode> {
    let db = state.db.clone();
    let unseen = state.unseen.clone();

    let response = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PUBLIC_USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY full_name"
            ))
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let users = stmt
            .query_map([&claims.sub], PublicUser::from_row)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let unseen_messages = unseen
            .counts_for(&conn, &claims.sub)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(ContactsResponse {
            users,
            unseen_messages,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(response))
}

/// GET /api/messages/{peer_id} — full conversation with a peer, ascending.
///
/// This fetch is also the mark-seen trigger: it records the caller as
/// actively viewing this peer and resets that pair's unseen count to zero.
/// The returned unseen map therefore covers all *other* peers.
pub async fn get_history(
    State(state): State<AppState>,
    claims: Claims,
    Path(peer_id): Path<String>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    // Viewing state flips before the store work so a message persisted while
    // this fetch runs is accounted against the new selection.
    state.unseen.begin_viewing(&claims.sub, &peer_id);

    let db = state.db.clone();
    let unseen = state.unseen.clone();

    let response = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        unseen
            .mark_thread_seen(&conn, &claims.sub, &peer_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, id ASC"
            ))
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let messages = stmt
            .query_map([&claims.sub, &peer_id], MessageRecord::from_row)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let unseen_messages = unseen
            .counts_for(&conn, &claims.sub)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(HistoryResponse {
            messages,
            unseen_messages,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(response))
}

/// POST /api/messages/send/{peer_id} — durably store a message, then relay.
/// 400 if neither text nor image is present, 404 for an unknown recipient.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(peer_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageRecord>), StatusCode> {
    let text = body.text.filter(|t| !t.is_empty());
    let image = body.image.filter(|i| !i.is_empty());
    if text.is_none() && image.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // The message is born seen only if the recipient has this sender's thread
    // open on a live connection right now. The online check matters: a viewing
    // entry left behind by a fetch with no socket must still count as unseen.
    let receiver_viewing = state.unseen.is_viewing(&peer_id, &claims.sub)
        && state.connections.is_online(&peer_id);

    let db = state.db.clone();
    let message = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let receiver_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [&peer_id],
                |row| row.get(0),
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if !receiver_exists {
            return Err(StatusCode::NOT_FOUND);
        }

        let message = MessageRecord {
            id: Uuid::now_v7().to_string(),
            sender_id: claims.sub,
            receiver_id: peer_id,
            text,
            image,
            seen: receiver_viewing,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image, seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                message.id,
                message.sender_id,
                message.receiver_id,
                message.text,
                message.image,
                message.seen,
                message.created_at,
            ],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(message)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    // Durable write committed — best-effort push may now run.
    relay::push_to_receiver(&state.connections, &message);

    Ok((StatusCode::CREATED, Json(message)))
}
