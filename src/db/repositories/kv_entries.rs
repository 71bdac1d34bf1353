use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{connection::Database, helpers::parse_datetime, models::KvEntry};
use crate::storage::KeyValueStore;

fn row_to_entry(row: &Row) -> Result<KvEntry> {
    let updated_at: String = row.get("updated_at")?;
    Ok(KvEntry {
        key: row.get("key")?,
        value: row.get("value")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn get_entry(&self, key: &str) -> Result<Option<KvEntry>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare("SELECT key, value, updated_at FROM kv_entries WHERE key = ?1")?;
            let entry = stmt
                .query_row(params![key], |row| Ok(row_to_entry(row)))
                .optional()?
                .transpose()?;
            Ok(entry)
        })
        .await
    }

    /// Upsert; the last completed write wins.
    pub async fn put_entry(&self, key: &str, value: &str, updated_at: DateTime<Utc>) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, updated_at.to_rfc3339()],
            )
            .context("failed to write kv entry")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_entry(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                .context("failed to delete kv entry")?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.put_entry(key, value, Utc::now()).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.delete_entry(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_overwrites_value() {
        let db = Database::in_memory().unwrap();
        db.set("steptrack_daily_steps", "10").await.unwrap();
        db.set("steptrack_daily_steps", "25").await.unwrap();

        assert_eq!(
            db.get("steptrack_daily_steps").await.unwrap().as_deref(),
            Some("25")
        );
    }

    #[tokio::test]
    async fn missing_key_reads_none_and_remove_is_quiet() {
        let db = Database::in_memory().unwrap();
        assert!(db.get("nope").await.unwrap().is_none());
        db.remove("nope").await.unwrap();
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("steptrack.sqlite3");
        {
            let db = Database::new(path.clone()).unwrap();
            db.set("k", "\"v\"").await.unwrap();
        }
        let db = Database::new(path).unwrap();
        assert_eq!(db.get("k").await.unwrap().as_deref(), Some("\"v\""));
    }
}
