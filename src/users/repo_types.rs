use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// ID of the placeholder identity shown for deleted or unknown accounts.
pub const GHOST_USER_ID: i64 = -1;

/// User record as far as avatars are concerned.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserIdentity {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub avatar_email: Option<String>, // address used for the remote avatar service
    pub use_custom_avatar: bool,
    pub avatar: String,               // avatar key, empty when unset
    pub created_at: OffsetDateTime,
}

impl UserIdentity {
    pub fn ghost() -> Self {
        Self {
            id: GHOST_USER_ID,
            name: "Ghost".into(),
            full_name: String::new(),
            email: None,
            avatar_email: None,
            use_custom_avatar: false,
            avatar: String::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    pub fn is_ghost(&self) -> bool {
        self.id == GHOST_USER_ID
    }

    /// Email for the remote avatar service, falling back to the account email.
    pub fn remote_avatar_email(&self) -> Option<&str> {
        self.avatar_email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| self.email.as_deref().filter(|e| !e.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_email_prefers_avatar_email() {
        let mut u = UserIdentity::ghost();
        assert_eq!(u.remote_avatar_email(), None);

        u.email = Some("a@b.com".into());
        assert_eq!(u.remote_avatar_email(), Some("a@b.com"));

        u.avatar_email = Some("  ".into());
        assert_eq!(u.remote_avatar_email(), Some("a@b.com"));

        u.avatar_email = Some("pic@b.com".into());
        assert_eq!(u.remote_avatar_email(), Some("pic@b.com"));
    }
}
