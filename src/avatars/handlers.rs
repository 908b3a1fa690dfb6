use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::{error, instrument};

use super::errors::AvatarError;
use super::services::{delete_avatar, upload_avatar};
use crate::auth::extractors::AuthUser;
use crate::state::AppState;
use crate::users::repo_types::{UserIdentity, GHOST_USER_ID};

const PRESIGN_TTL_SECS: u64 = 10 * 60;

lazy_static! {
    static ref AVATAR_KEY_RE: Regex = Regex::new(r"^[0-9a-f]{64}$").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct SizeQuery {
    #[serde(default)]
    pub size: i64,
}

impl SizeQuery {
    /// Non-positive sizes mean the default size.
    pub fn pixels(&self) -> u32 {
        self.size.clamp(0, u32::MAX as i64) as u32
    }
}

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/avatars/:key", get(serve_avatar))
        .route("/users/:id/avatar", get(user_avatar))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/user/avatar",
            post(upload_user_avatar).delete(delete_user_avatar),
        )
        .layer(DefaultBodyLimit::max(8 * 1024 * 1024))
}

// --- handlers ---

/// GET /avatars/:key → 302 to a presigned url of the stored blob
#[instrument(skip(state))]
pub async fn serve_avatar(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if !AVATAR_KEY_RE.is_match(&key) {
        return (StatusCode::NOT_FOUND, "Avatar not found").into_response();
    }

    match state.storage.exists(&key).await {
        Ok(true) => {}
        Ok(false) => return (StatusCode::NOT_FOUND, "Avatar not found").into_response(),
        Err(e) => {
            error!(error = %e, %key, "avatar lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response();
        }
    }

    let Ok(url) = state.storage.presign_get(&key, PRESIGN_TTL_SECS).await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "presign failed").into_response();
    };

    Redirect::temporary(&url).into_response()
}

/// GET /users/:id/avatar?size=N → 302 to wherever the avatar lives
#[instrument(skip(state))]
pub async fn user_avatar(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<SizeQuery>,
) -> Redirect {
    let mut user = if id == GHOST_USER_ID {
        UserIdentity::ghost()
    } else {
        match state.users.find_by_id(id).await {
            Ok(Some(u)) => u,
            Ok(None) => UserIdentity::ghost(),
            Err(e) => {
                error!(error = %e, user_id = id, "user lookup failed");
                UserIdentity::ghost()
            }
        }
    };

    let policy = state.avatar_policy().await;
    let link = state.resolver(policy).resolve(&mut user, q.pixels()).await;
    Redirect::temporary(&link)
}

/// POST /api/v1/user/avatar (multipart, field `avatar`)
#[instrument(skip(state, mp))]
pub async fn upload_user_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut data: Option<Bytes> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| (e.status(), e.body_text()))?
    {
        if field.name() == Some("avatar") {
            data = Some(field.bytes().await.map_err(|e| (e.status(), e.body_text()))?);
        }
    }
    let data = data.ok_or((StatusCode::BAD_REQUEST, "avatar is required".to_string()))?;

    let mut user = load_user(&state, user_id).await?;
    upload_avatar(&state, &mut user, &data)
        .await
        .map_err(avatar_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/user/avatar
#[instrument(skip(state))]
pub async fn delete_user_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut user = load_user(&state, user_id).await?;
    delete_avatar(&state, &mut user).await.map_err(avatar_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn load_user(state: &AppState, user_id: i64) -> Result<UserIdentity, (StatusCode, String)> {
    match state.users.find_by_id(user_id).await {
        Ok(Some(u)) => Ok(u),
        Ok(None) => Err((StatusCode::NOT_FOUND, "User not found".into())),
        Err(e) => {
            error!(error = %e, %user_id, "user lookup failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "user lookup failed".into()))
        }
    }
}

fn avatar_error(e: AvatarError) -> (StatusCode, String) {
    let status = match &e {
        AvatarError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AvatarError::InvalidImage(_) | AvatarError::Dimensions { .. } => StatusCode::BAD_REQUEST,
        _ => {
            error!(error = %e, "avatar update failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}
