use serde::Serialize;

use super::repo_types::UserIdentity;

/// Public API shape of a user.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub login: String,
    pub full_name: String,
    pub email: String,
    pub avatar_url: String,
}

impl UserResponse {
    pub fn from_user(user: &UserIdentity, avatar_url: String) -> Self {
        Self {
            id: user.id,
            login: user.name.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone().unwrap_or_default(),
            avatar_url,
        }
    }
}
