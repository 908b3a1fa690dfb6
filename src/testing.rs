//! In-memory stand-ins for storage and the database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::settings::SettingsRepo;
use crate::storage::StorageClient;
use crate::users::{repo::UserRepo, repo_types::UserIdentity};

pub fn user(id: i64, name: &str, email: Option<&str>) -> UserIdentity {
    let mut u = UserIdentity::ghost();
    u.id = id;
    u.name = name.into();
    u.email = email.map(String::from);
    u
}

#[derive(Default)]
pub struct MemStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    pub puts: AtomicUsize,
    pub exists_calls: AtomicUsize,
    pub deletes: AtomicUsize,
    pub presigns: AtomicUsize,
    pub fail_puts: AtomicBool,
}

impl MemStorage {
    pub fn calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
            + self.exists_calls.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
            + self.presigns.load(Ordering::SeqCst)
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, body: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(body));
    }
}

#[async_trait]
impl StorageClient for MemStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
        self.presigns.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://fake.local/{}", key))
    }
}

#[derive(Default)]
pub struct MemUsers {
    rows: Mutex<HashMap<i64, UserIdentity>>,
    calls: AtomicUsize,
    pub fail_updates: AtomicBool,
}

impl MemUsers {
    pub fn insert(&self, user: UserIdentity) {
        self.rows.lock().unwrap().insert(user.id, user);
    }

    pub fn get(&self, id: i64) -> Option<UserIdentity> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn update(&self, id: i64, f: impl FnOnce(&mut UserIdentity)) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            f(row);
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepo for MemUsers {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<UserIdentity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(id))
    }

    async fn set_avatar(&self, id: i64, avatar: &str) -> anyhow::Result<()> {
        self.update(id, |u| u.avatar = avatar.to_string())
    }

    async fn set_custom_avatar(&self, id: i64, use_custom: bool, avatar: &str) -> anyhow::Result<()> {
        self.update(id, |u| {
            u.use_custom_avatar = use_custom;
            u.avatar = avatar.to_string();
        })
    }

    async fn exists_with_avatar(&self, storage_path: &str) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .any(|u| u.avatar == storage_path))
    }
}

#[derive(Default)]
pub struct MemSettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemSettings {
    pub fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl SettingsRepo for MemSettings {
    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }
}
