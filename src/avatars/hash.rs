use sha2::{Digest, Sha256};

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Seeds differing only in case or surrounding whitespace are the same seed.
pub fn normalize_seed(seed: &str) -> String {
    seed.trim().to_lowercase()
}

/// Key for an email or name seed, over the normalized seed. Remote avatar
/// services expect the same normalization.
pub fn hash_email(email: &str) -> String {
    sha256_hex(normalize_seed(email).as_bytes())
}

/// Key for uploaded content, scoped to the uploading user so identical files
/// from different users land in different blobs.
pub fn upload_avatar_key(user_id: i64, data: &[u8]) -> String {
    sha256_hex(format!("{}-{}", user_id, sha256_hex(data)).as_bytes())
}
