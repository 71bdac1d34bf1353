//! Local persistent key-value storage. Values are JSON text.

mod memory;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}
