use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::repo_types::UserIdentity;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<UserIdentity>>;
    /// Sets only the avatar key of one user.
    async fn set_avatar(&self, id: i64, avatar: &str) -> anyhow::Result<()>;
    /// Sets the custom-avatar flag and key of one user together.
    async fn set_custom_avatar(&self, id: i64, use_custom: bool, avatar: &str) -> anyhow::Result<()>;
    async fn exists_with_avatar(&self, storage_path: &str) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<UserIdentity>> {
        let user = sqlx::query_as::<_, UserIdentity>(
            r#"
            SELECT id, name, full_name, email, avatar_email, use_custom_avatar, avatar, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn set_avatar(&self, id: i64, avatar: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET avatar = $2
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(avatar)
        .execute(&self.db)
        .await
        .context("update user avatar")?;
        Ok(())
    }

    async fn set_custom_avatar(&self, id: i64, use_custom: bool, avatar: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET use_custom_avatar = $2, avatar = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(use_custom)
        .bind(avatar)
        .execute(&self.db)
        .await
        .context("update user custom avatar")?;
        Ok(())
    }

    async fn exists_with_avatar(&self, storage_path: &str) -> anyhow::Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM users WHERE avatar = $1)
            "#,
        )
        .bind(storage_path)
        .fetch_one(&self.db)
        .await
        .context("check avatar reference")?;
        Ok(exists)
    }
}
