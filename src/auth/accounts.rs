//! Account CRUD: signup, login, token check, and profile updates.
//!
//! This surface is deliberately thin — the realtime core only needs a stable
//! user identity out of it. Passwords are hashed with argon2id; profile
//! pictures are stored as opaque reference strings (media storage is external).

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt;
use crate::auth::middleware::Claims;
use crate::db::models::{PublicUser, PUBLIC_USER_COLUMNS};
use crate::state::AppState;

/// Bio assigned to accounts that sign up without one.
const DEFAULT_BIO: &str = "Hey there, I am using QuickChat!";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub profile_pic: Option<String>,
}

fn hash_password(password: &str) -> Result<String, StatusCode> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// POST /api/auth/signup — create an account and return a token.
/// 400 on missing fields, 409 if the email is already registered.
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), StatusCode> {
    // Trim once; the duplicate check and the stored row must agree on the
    // canonical form or a padded duplicate slips past to the UNIQUE constraint.
    let email = body.email.trim().to_string();
    if body.full_name.trim().is_empty() || email.is_empty() || body.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || {
        let password_hash = hash_password(&body.password)?;

        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                rusqlite::params![email],
                |row| row.get(0),
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if exists {
            return Err(StatusCode::CONFLICT);
        }

        let user = PublicUser {
            id: Uuid::now_v7().to_string(),
            full_name: body.full_name.trim().to_string(),
            email,
            bio: body.bio.unwrap_or_else(|| DEFAULT_BIO.to_string()),
            profile_pic: None,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO users (id, full_name, email, password_hash, bio, profile_pic, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            rusqlite::params![
                user.id,
                user.full_name,
                user.email,
                password_hash,
                user.bio,
                user.profile_pic,
                user.created_at,
            ],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(user)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let token = jwt::issue_token(&state.jwt_secret, &user.id, &user.email)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    tracing::info!(user_id = %user.id, "Account created");
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// POST /api/auth/login — verify credentials and return a token.
/// Responds 401 for both unknown email and wrong password.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let (password_hash, user): (String, PublicUser) = conn
            .query_row(
                &format!(
                    "SELECT password_hash, {PUBLIC_USER_COLUMNS} FROM users WHERE email = ?1"
                ),
                rusqlite::params![body.email],
                |row| {
                    let hash: String = row.get(0)?;
                    let user = PublicUser {
                        id: row.get(1)?,
                        full_name: row.get(2)?,
                        email: row.get(3)?,
                        bio: row.get(4)?,
                        profile_pic: row.get(5)?,
                        created_at: row.get(6)?,
                    };
                    Ok((hash, user))
                },
            )
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        if !verify_password(&body.password, &password_hash) {
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok::<_, StatusCode>(user)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let token = jwt::issue_token(&state.jwt_secret, &user.id, &user.email)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(AuthResponse { token, user }))
}

/// GET /api/auth/check — return the authenticated user's profile.
pub async fn check(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<PublicUser>, StatusCode> {
    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        conn.query_row(
            &format!("SELECT {PUBLIC_USER_COLUMNS} FROM users WHERE id = ?1"),
            rusqlite::params![claims.sub],
            PublicUser::from_row,
        )
        .map_err(|_| StatusCode::UNAUTHORIZED)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(user))
}

/// PUT /api/auth/profile — update name/bio/profile picture.
/// Absent fields are left unchanged.
pub async fn update_profile(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, StatusCode> {
    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut user: PublicUser = conn
            .query_row(
                &format!("SELECT {PUBLIC_USER_COLUMNS} FROM users WHERE id = ?1"),
                rusqlite::params![claims.sub],
                PublicUser::from_row,
            )
            .map_err(|_| StatusCode::NOT_FOUND)?;

        if let Some(full_name) = body.full_name {
            if full_name.trim().is_empty() {
                return Err(StatusCode::BAD_REQUEST);
            }
            user.full_name = full_name.trim().to_string();
        }
        if let Some(bio) = body.bio {
            user.bio = bio;
        }
        if let Some(profile_pic) = body.profile_pic {
            user.profile_pic = Some(profile_pic);
        }

        conn.execute(
            "UPDATE users SET full_name = ?1, bio = ?2, profile_pic = ?3, updated_at = ?4 WHERE id = ?5",
            rusqlite::params![user.full_name, user.bio, user.profile_pic, Utc::now(), user.id],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(user)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(user))
}
