use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};

use super::errors::AvatarError;
use super::gen::{avatar_seed, encode_png, random_image};
use super::hash::{hash_email, normalize_seed, upload_avatar_key};
use super::links::AvatarLinks;
use crate::storage::StorageClient;
use crate::users::{repo::UserRepo, repo_types::UserIdentity};

/// Runtime switches that decide whether the remote avatar service may be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvatarPolicy {
    pub offline_mode: bool,
    pub disable_gravatar: bool,
}

impl AvatarPolicy {
    pub fn remote_disabled(&self) -> bool {
        self.offline_mode || self.disable_gravatar
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarSource {
    Default,
    Local,
    Remote,
}

pub struct AvatarResolver<'a> {
    users: &'a dyn UserRepo,
    storage: &'a dyn StorageClient,
    links: &'a AvatarLinks,
    policy: AvatarPolicy,
}

impl<'a> AvatarResolver<'a> {
    pub fn new(
        users: &'a dyn UserRepo,
        storage: &'a dyn StorageClient,
        links: &'a AvatarLinks,
        policy: AvatarPolicy,
    ) -> Self {
        Self {
            users,
            storage,
            links,
            policy,
        }
    }

    pub fn source_for(&self, user: &UserIdentity) -> AvatarSource {
        if user.is_ghost() {
            AvatarSource::Default
        } else if user.use_custom_avatar || self.policy.remote_disabled() {
            AvatarSource::Local
        } else {
            AvatarSource::Remote
        }
    }

    /// Link for `user` at `size` pixels (`0` = default size). Never fails:
    /// anything that goes wrong ends in the default avatar.
    pub async fn resolve(&self, user: &mut UserIdentity, size: u32) -> String {
        match self.source_for(user) {
            AvatarSource::Default => self.links.default_avatar(),
            AvatarSource::Local => match self.ensure_avatar(user).await {
                Ok(key) => self.build_link(&key, size),
                Err(e) => {
                    error!(error = %e, user_id = user.id, "avatar generation failed");
                    self.links.default_avatar()
                }
            },
            AvatarSource::Remote => match user.remote_avatar_email() {
                Some(email) => self.links.remote(email, size),
                None => self.links.default_avatar(),
            },
        }
    }

    /// Returns the user's avatar key, generating and storing an identicon
    /// first when none is set.
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn ensure_avatar(&self, user: &mut UserIdentity) -> Result<String, AvatarError> {
        if !user.avatar.is_empty() {
            return Ok(user.avatar.clone());
        }

        // key and pixels both come from the normalized seed so one key never
        // maps to two different images
        let seed = normalize_seed(avatar_seed(user));
        let png = encode_png(&random_image(seed.as_bytes())).map_err(|e| {
            error!(error = %e, "encode random avatar");
            AvatarError::Encoding(e)
        })?;
        let key = hash_email(&seed);

        let exists = match self.storage.exists(&key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, %key, "avatar existence check failed; writing anyway");
                false
            }
        };
        if exists {
            debug!(%key, "avatar blob already stored");
        } else {
            self.storage
                .put_object(&key, Bytes::from(png), "image/png")
                .await
                .map_err(|source| AvatarError::StorageWrite {
                    key: key.clone(),
                    source,
                })?;
        }

        if let Err(source) = self.users.set_avatar(user.id, &key).await {
            error!(error = %source, %key, "avatar blob stored but user row not updated");
            return Err(AvatarError::Persistence {
                user_id: user.id,
                key,
                source,
            });
        }

        user.avatar = key.clone();
        info!("new random avatar created");
        Ok(key)
    }

    pub fn build_link(&self, key: &str, size: u32) -> String {
        self.links.local(key, size)
    }

    /// Whether any user still points at `path`; blobs that nobody references
    /// can be collected.
    pub async fn is_storage_path_referenced(&self, path: &str) -> Result<bool, AvatarError> {
        self.users
            .exists_with_avatar(path)
            .await
            .map_err(AvatarError::Lookup)
    }
}

/// Whether uploading `data` would give `user` a different avatar key.
pub fn would_change_avatar(user: &UserIdentity, data: &[u8]) -> bool {
    if !user.use_custom_avatar || user.avatar.is_empty() {
        return true;
    }
    user.avatar != upload_avatar_key(user.id, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AvatarConfig;
    use crate::testing::{user, MemStorage, MemUsers};
    use std::sync::atomic::Ordering;

    fn links() -> AvatarLinks {
        AvatarLinks::from_config(&AvatarConfig::default()).unwrap()
    }

    const OFFLINE: AvatarPolicy = AvatarPolicy {
        offline_mode: true,
        disable_gravatar: false,
    };

    #[tokio::test]
    async fn ghost_gets_default_without_storage_access() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        for policy in [AvatarPolicy::default(), OFFLINE] {
            let r = AvatarResolver::new(&users, &storage, &links, policy);
            let mut ghost = UserIdentity::ghost();
            assert_eq!(r.resolve(&mut ghost, 64).await, "/assets/img/avatar_default.png");
        }
        assert_eq!(storage.calls(), 0);
        assert_eq!(users.calls(), 0);
    }

    #[tokio::test]
    async fn offline_generates_persists_and_links_locally() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let mut u = user(1, "alice", Some("a@b.com"));
        users.insert(u.clone());

        let r = AvatarResolver::new(&users, &storage, &links, OFFLINE);
        let link = r.resolve(&mut u, 48).await;

        let key = hash_email("a@b.com");
        assert_eq!(link, format!("/avatars/{}?size=48", key));
        assert_eq!(u.avatar, key);
        assert_eq!(users.get(1).unwrap().avatar, key);

        let stored = storage.object(&key).expect("blob stored");
        let expected = encode_png(&random_image(b"a@b.com")).unwrap();
        assert_eq!(stored.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn offline_never_links_remote() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, OFFLINE);
        for (id, email) in [(2, Some("x@y.z")), (3, None), (4, Some(""))] {
            let mut u = user(id, "bob", email);
            users.insert(u.clone());
            let link = r.resolve(&mut u, 0).await;
            assert!(!link.contains("://"), "{link}");
            assert!(link.starts_with("/avatars/"), "{link}");
        }
    }

    #[tokio::test]
    async fn disabled_gravatar_setting_is_local_too() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let policy = AvatarPolicy {
            offline_mode: false,
            disable_gravatar: true,
        };
        let r = AvatarResolver::new(&users, &storage, &links, policy);
        let mut u = user(5, "carol", None);
        users.insert(u.clone());
        assert_eq!(r.source_for(&u), AvatarSource::Local);
        let link = r.resolve(&mut u, 0).await;
        assert_eq!(link, format!("/avatars/{}", hash_email("carol")));
    }

    #[tokio::test]
    async fn remote_path_touches_nothing() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, AvatarPolicy::default());

        let mut u = user(6, "dave", Some("d@e.com"));
        let link = r.resolve(&mut u, 32).await;
        assert_eq!(link, links.remote("d@e.com", 32));
        assert!(u.avatar.is_empty());

        let mut no_email = user(7, "erin", None);
        assert_eq!(r.resolve(&mut no_email, 32).await, links.default_avatar());

        assert_eq!(storage.calls(), 0);
        assert_eq!(users.calls(), 0);
    }

    #[tokio::test]
    async fn custom_avatar_uses_existing_key() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, AvatarPolicy::default());

        let mut u = user(8, "frank", Some("f@g.com"));
        u.use_custom_avatar = true;
        u.avatar = "deadbeef".into();
        assert_eq!(r.resolve(&mut u, 0).await, "/avatars/deadbeef");
        assert_eq!(storage.calls(), 0);
    }

    #[tokio::test]
    async fn generation_is_deterministic_and_writes_once() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, OFFLINE);

        let mut a = user(9, "gina", Some("same@x.com"));
        let mut b = user(10, "hank", Some("same@x.com"));
        users.insert(a.clone());
        users.insert(b.clone());

        let ka = r.ensure_avatar(&mut a).await.unwrap();
        let kb = r.ensure_avatar(&mut b).await.unwrap();
        assert_eq!(ka, kb);
        assert_eq!(storage.puts.load(Ordering::SeqCst), 1);

        // already set: no storage access at all
        let before = storage.calls();
        assert_eq!(r.ensure_avatar(&mut a).await.unwrap(), ka);
        assert_eq!(storage.calls(), before);
    }

    #[tokio::test]
    async fn case_variant_seeds_share_key_and_image() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, OFFLINE);

        let mut upper = user(16, "Alice", None);
        let mut lower = user(17, " alice", None);
        users.insert(upper.clone());
        users.insert(lower.clone());

        let ku = r.ensure_avatar(&mut upper).await.unwrap();
        let kl = r.ensure_avatar(&mut lower).await.unwrap();
        assert_eq!(ku, kl);
        assert_eq!(storage.puts.load(Ordering::SeqCst), 1);

        let stored = storage.object(&kl).unwrap();
        for seed in ["Alice", " alice", "alice"] {
            let own = encode_png(&random_image(normalize_seed(seed).as_bytes())).unwrap();
            assert_eq!(stored.as_ref(), own.as_slice(), "{seed}");
        }
    }

    #[tokio::test]
    async fn custom_flag_without_key_generates_locally() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, AvatarPolicy::default());

        let mut u = user(18, "nora", Some("n@o.ra"));
        u.use_custom_avatar = true;
        users.insert(u.clone());
        assert_eq!(r.source_for(&u), AvatarSource::Local);

        let link = r.resolve(&mut u, 24).await;
        let key = hash_email("n@o.ra");
        assert_eq!(link, format!("/avatars/{}?size=24", key));
        assert!(!link.contains("gravatar"));
        assert_ne!(link, links.remote("n@o.ra", 24));

        let row = users.get(18).unwrap();
        assert_eq!(row.avatar, key);
        assert!(row.use_custom_avatar);
        assert!(storage.object(&key).is_some());
    }

    #[tokio::test]
    async fn storage_failure_degrades_to_default() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        storage.fail_puts.store(true, Ordering::SeqCst);
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, OFFLINE);

        let mut u = user(11, "ivy", Some("i@v.y"));
        users.insert(u.clone());
        assert!(matches!(
            r.ensure_avatar(&mut u.clone()).await,
            Err(AvatarError::StorageWrite { .. })
        ));
        assert_eq!(r.resolve(&mut u, 16).await, links.default_avatar());
        assert!(u.avatar.is_empty());
        assert!(users.get(11).unwrap().avatar.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_is_reported() {
        let users = MemUsers::default();
        users.fail_updates.store(true, Ordering::SeqCst);
        let storage = MemStorage::default();
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, OFFLINE);

        let mut u = user(12, "jay", None);
        let err = r.ensure_avatar(&mut u).await.unwrap_err();
        match err {
            AvatarError::Persistence { user_id, key, .. } => {
                assert_eq!(user_id, 12);
                assert!(storage.object(&key).is_some());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(u.avatar.is_empty());
        assert_eq!(r.resolve(&mut u, 0).await, links.default_avatar());
    }

    #[tokio::test]
    async fn storage_path_reference_check() {
        let users = MemUsers::default();
        let storage = MemStorage::default();
        let links = links();
        let r = AvatarResolver::new(&users, &storage, &links, OFFLINE);

        let mut u = user(13, "kim", None);
        u.avatar = "abc".into();
        users.insert(u);
        assert!(r.is_storage_path_referenced("abc").await.unwrap());
        assert!(!r.is_storage_path_referenced("xyz").await.unwrap());
    }

    #[test]
    fn would_change_without_custom_key() {
        let mut u = user(14, "lee", None);
        assert!(would_change_avatar(&u, b"anything"));
        assert!(would_change_avatar(&u, b""));

        u.use_custom_avatar = true;
        assert!(would_change_avatar(&u, b"anything"));

        u.use_custom_avatar = false;
        u.avatar = upload_avatar_key(14, b"anything");
        assert!(would_change_avatar(&u, b"anything"));
    }

    #[test]
    fn would_change_compares_content_key() {
        let mut u = user(15, "max", None);
        u.use_custom_avatar = true;
        u.avatar = upload_avatar_key(15, b"png-bytes");
        assert!(!would_change_avatar(&u, b"png-bytes"));
        assert!(would_change_avatar(&u, b"other-bytes"));
    }
}
