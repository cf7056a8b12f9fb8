//! Row types for the users and messages tables, doubling as wire DTOs.
//! JSON field names are camelCase to match the client API.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// User record as exposed to clients. The password hash never leaves the DB layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub bio: String,
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Column list matching [`PublicUser::from_row`].
pub const PUBLIC_USER_COLUMNS: &str = "id, full_name, email, bio, profile_pic, created_at";

impl PublicUser {
    /// Map a row selected with [`PUBLIC_USER_COLUMNS`].
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            full_name: row.get(1)?,
            email: row.get(2)?,
            bio: row.get(3)?,
            profile_pic: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

/// A persisted chat message. Immutable once created; at least one of
/// text/image is present (enforced by a schema CHECK).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    /// Opaque image reference (URL or data URI) — media storage is external.
    pub image: Option<String>,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

/// Column list matching [`MessageRecord::from_row`].
pub const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, image, seen, created_at";

impl MessageRecord {
    /// Map a row selected with [`MESSAGE_COLUMNS`].
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            text: row.get(3)?,
            image: row.get(4)?,
            seen: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    /// True if this message travels between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}
