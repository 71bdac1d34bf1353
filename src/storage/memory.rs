use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::KeyValueStore;

/// Process-local store. `set_unavailable(true)` makes every call fail, which
/// is how tests exercise storage outages.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("storage unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_available()?;
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_available()?;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();

        store.set_unavailable(true);
        assert!(store.get("a").await.is_err());
        assert!(store.set("a", "2").await.is_err());

        store.set_unavailable(false);
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    }
}
