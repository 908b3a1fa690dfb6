use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::config::parse_bool;

pub const KEY_PICTURE_DISABLE_GRAVATAR: &str = "picture.disable_gravatar";

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>>;
}

#[derive(Clone)]
pub struct PgSettingsRepo {
    db: PgPool,
}

impl PgSettingsRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SettingsRepo for PgSettingsRepo {
    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT setting_value
              FROM system_settings
             WHERE setting_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .with_context(|| format!("get setting {}", key))?;
        Ok(row.map(|(v,)| v))
    }
}

/// Reads the administrative "disable gravatar" switch. Missing, unreadable
/// or unparsable values fall back to `default`.
pub async fn disable_gravatar(repo: &dyn SettingsRepo, default: bool) -> bool {
    match repo.get_setting(KEY_PICTURE_DISABLE_GRAVATAR).await {
        Ok(Some(v)) => parse_bool(&v).unwrap_or_else(|| {
            warn!(value = %v, key = KEY_PICTURE_DISABLE_GRAVATAR, "unparsable setting");
            default
        }),
        Ok(None) => default,
        Err(e) => {
            warn!(error = %e, key = KEY_PICTURE_DISABLE_GRAVATAR, "setting lookup failed");
            default
        }
    }
}
