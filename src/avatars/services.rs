use std::io::Cursor;

use bytes::Bytes;
use image::{imageops::FilterType, io::Reader as ImageReader, ImageError};
use tracing::{debug, info, instrument, warn};

use super::errors::AvatarError;
use super::gen::{encode_png, DEFAULT_AVATAR_SIZE};
use super::hash::upload_avatar_key;
use super::resolver::would_change_avatar;
use crate::config::AvatarConfig;
use crate::state::AppState;
use crate::users::repo_types::UserIdentity;

/// Stores `data` as the user's custom avatar and returns its key. Re-uploading
/// the current image is a no-op.
#[instrument(skip(st, user, data), fields(user_id = user.id, bytes = data.len()))]
pub async fn upload_avatar(
    st: &AppState,
    user: &mut UserIdentity,
    data: &[u8],
) -> Result<String, AvatarError> {
    let cfg = &st.config.avatar;
    if data.len() > cfg.max_upload_bytes {
        return Err(AvatarError::TooLarge {
            size: data.len(),
            max: cfg.max_upload_bytes,
        });
    }
    if !would_change_avatar(user, data) {
        debug!("avatar unchanged");
        return Ok(user.avatar.clone());
    }

    let png = prepare(data, cfg)?;
    let key = upload_avatar_key(user.id, data);

    st.storage
        .put_object(&key, Bytes::from(png), "image/png")
        .await
        .map_err(|source| AvatarError::StorageWrite {
            key: key.clone(),
            source,
        })?;

    st.users
        .set_custom_avatar(user.id, true, &key)
        .await
        .map_err(|source| AvatarError::Persistence {
            user_id: user.id,
            key: key.clone(),
            source,
        })?;

    let old = std::mem::replace(&mut user.avatar, key.clone());
    user.use_custom_avatar = true;
    if !old.is_empty() && old != key {
        remove_if_unreferenced(st, &old).await;
    }

    info!(%key, "custom avatar uploaded");
    Ok(key)
}

/// Drops the custom avatar; the user falls back to the normal policy.
#[instrument(skip(st, user), fields(user_id = user.id))]
pub async fn delete_avatar(st: &AppState, user: &mut UserIdentity) -> Result<(), AvatarError> {
    st.users
        .set_custom_avatar(user.id, false, "")
        .await
        .map_err(|source| AvatarError::Persistence {
            user_id: user.id,
            key: String::new(),
            source,
        })?;

    let old = std::mem::take(&mut user.avatar);
    user.use_custom_avatar = false;
    if !old.is_empty() {
        remove_if_unreferenced(st, &old).await;
    }
    info!("custom avatar removed");
    Ok(())
}

async fn remove_if_unreferenced(st: &AppState, key: &str) {
    match st.resolver(Default::default()).is_storage_path_referenced(key).await {
        Ok(true) => debug!(%key, "old avatar still referenced"),
        Ok(false) => {
            if let Err(e) = st.storage.delete_object(key).await {
                warn!(error = %e, %key, "delete old avatar");
            }
        }
        Err(e) => warn!(error = %e, %key, "old avatar reference check failed"),
    }
}

/// Decodes, bounds-checks and squares an uploaded image, re-encoded as PNG.
fn prepare(data: &[u8], cfg: &AvatarConfig) -> Result<Vec<u8>, AvatarError> {
    let reader = || {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| AvatarError::InvalidImage(ImageError::IoError(e)))
    };

    let (width, height) = reader()?
        .into_dimensions()
        .map_err(AvatarError::InvalidImage)?;
    if width > cfg.max_width || height > cfg.max_height {
        return Err(AvatarError::Dimensions {
            width,
            height,
            max_width: cfg.max_width,
            max_height: cfg.max_height,
        });
    }

    let img = reader()?.decode().map_err(AvatarError::InvalidImage)?;
    let img = if width == DEFAULT_AVATAR_SIZE && height == DEFAULT_AVATAR_SIZE {
        img
    } else {
        img.resize_to_fill(DEFAULT_AVATAR_SIZE, DEFAULT_AVATAR_SIZE, FilterType::Triangle)
    };
    encode_png(&img.to_rgba8()).map_err(AvatarError::Encoding)
}
