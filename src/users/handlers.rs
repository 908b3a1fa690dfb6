use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, instrument};

use super::dto::UserResponse;
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/api/v1/users/:id", get(get_user))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, (StatusCode, String)> {
    let mut user = match state.users.find_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => return Err((StatusCode::NOT_FOUND, "User not found".into())),
        Err(e) => {
            error!(error = %e, user_id = id, "get_user failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "user lookup failed".into()));
        }
    };

    let policy = state.avatar_policy().await;
    let link = state.resolver(policy).resolve(&mut user, 0).await;
    let avatar_url = state.links.absolute(&link);
    Ok(Json(UserResponse::from_user(&user, avatar_url)))
}
