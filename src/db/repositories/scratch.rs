use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::Database;
use crate::scratch::ScratchStore;

#[async_trait]
impl ScratchStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM scratch WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read scratch key {key}"))?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO scratch (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write scratch key {key}"))?;
            Ok(())
        })
        .await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM scratch WHERE key = ?1", params![key])
                .with_context(|| format!("failed to clear scratch key {key}"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("rival.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            db.set("active_session", "{\"phase\":\"focus\"}").await.unwrap();
            db.set("other", "1").await.unwrap();
            db.clear("other").await.unwrap();
        }

        let db = Database::new(path).unwrap();
        assert_eq!(
            db.get("active_session").await.unwrap().as_deref(),
            Some("{\"phase\":\"focus\"}")
        );
        assert_eq!(db.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("rival.sqlite3")).unwrap();
        db.set("k", "a").await.unwrap();
        db.set("k", "b").await.unwrap();
        assert_eq!(db.get("k").await.unwrap().as_deref(), Some("b"));
    }
}
