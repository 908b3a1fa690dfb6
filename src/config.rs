use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvatarConfig {
    /// Absolute base URL of the web UI, always ending in `/`.
    pub app_url: String,
    /// Path prefix the UI is mounted under, empty or starting with `/`.
    pub app_sub_url: String,
    pub offline_mode: bool,
    /// Used when the `picture.disable_gravatar` system setting is absent.
    pub disable_gravatar: bool,
    pub gravatar_source: String,
    pub max_upload_bytes: usize,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:3000/".into(),
            app_sub_url: String::new(),
            offline_mode: false,
            disable_gravatar: false,
            gravatar_source: "https://secure.gravatar.com/avatar".into(),
            max_upload_bytes: 1024 * 1024,
            max_width: 4096,
            max_height: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub minio_endpoint: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub avatar: AvatarConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "forge".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "forge-users".into()),
        };

        let defaults = AvatarConfig::default();
        let app_sub_url = normalize_sub_url(&std::env::var("APP_SUB_URL").unwrap_or_default());
        let avatar = AvatarConfig {
            app_url: normalize_app_url(
                &std::env::var("APP_URL").unwrap_or(defaults.app_url),
            ),
            app_sub_url,
            offline_mode: env_flag("OFFLINE_MODE", defaults.offline_mode),
            disable_gravatar: env_flag("DISABLE_GRAVATAR", defaults.disable_gravatar),
            gravatar_source: std::env::var("GRAVATAR_SOURCE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gravatar_source),
            max_upload_bytes: env_parse("AVATAR_MAX_FILE_SIZE", defaults.max_upload_bytes),
            max_width: env_parse("AVATAR_MAX_WIDTH", defaults.max_width),
            max_height: env_parse("AVATAR_MAX_HEIGHT", defaults.max_height),
        };

        Ok(Self {
            database_url,
            jwt,
            minio_endpoint: std::env::var("MINIO_ENDPOINT")?,
            minio_bucket: std::env::var("MINIO_AVATAR_BUCKET").unwrap_or_else(|_| "avatars".into()),
            minio_access_key: std::env::var("MINIO_ACCESS_KEY")?,
            minio_secret_key: std::env::var("MINIO_SECRET_KEY")?,
            avatar,
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Accepts the same spellings as Go's `strconv.ParseBool`, which is what
/// settings written by the web UI use.
pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn normalize_app_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    format!("{}/", trimmed)
}

fn normalize_sub_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
