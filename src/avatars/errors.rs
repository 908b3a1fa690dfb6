use thiserror::Error;

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("encode avatar png: {0}")]
    Encoding(#[source] image::ImageError),

    #[error("store avatar blob {key}: {source}")]
    StorageWrite {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The blob may already exist in storage while the user row still points
    /// elsewhere.
    #[error("persist avatar {key} for user {user_id}: {source}")]
    Persistence {
        user_id: i64,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("avatar reference lookup: {0}")]
    Lookup(#[source] anyhow::Error),

    #[error("invalid avatar image: {0}")]
    InvalidImage(#[source] image::ImageError),

    #[error("avatar image is {width}x{height}, limit is {max_width}x{max_height}")]
    Dimensions {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("avatar upload of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: usize },
}
