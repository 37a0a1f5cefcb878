//! libSQL backend for the async `Database` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row.get(0).unwrap_or_else(|_| "null".to_string());
                let value = serde_json::from_str(&value_str).unwrap_or_else(|e| {
                    warn!(user_id, key, error = %e, "Setting holds unparsable JSON");
                    serde_json::Value::Null
                });
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO settings (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
            params![user_id, key, value_str, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;

        Ok(())
    }

    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute(
                "DELETE FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_setting: {e}")))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn settings_crud() {
        let db = test_db().await;
        let value = serde_json::json!({"plan_type": "clinic", "current_step": 1});

        db.set_setting("user1", "onboarding_progress", &value)
            .await
            .unwrap();

        let fetched = db
            .get_setting("user1", "onboarding_progress")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched["plan_type"], "clinic");
        assert_eq!(fetched["current_step"], 1);

        // Upsert
        let updated = serde_json::json!({"plan_type": "company"});
        db.set_setting("user1", "onboarding_progress", &updated)
            .await
            .unwrap();
        let fetched2 = db
            .get_setting("user1", "onboarding_progress")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched2["plan_type"], "company");

        let deleted = db.delete_setting("user1", "onboarding_progress").await.unwrap();
        assert!(deleted);
        let gone = db.get_setting("user1", "onboarding_progress").await.unwrap();
        assert!(gone.is_none());

        let again = db.delete_setting("user1", "onboarding_progress").await.unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn settings_are_scoped_per_user() {
        let db = test_db().await;
        db.set_setting("alice", "k", &serde_json::json!(1)).await.unwrap();
        assert!(db.get_setting("bob", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unparsable_setting_reads_as_null() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO settings (user_id, key, value) VALUES ('u', 'k', '{not json')",
                (),
            )
            .await
            .unwrap();
        let value = db.get_setting("u", "k").await.unwrap();
        assert_eq!(value, Some(serde_json::Value::Null));
    }

    #[tokio::test]
    async fn new_local_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("onboarding.db");
        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        db.set_setting("u", "k", &serde_json::json!(true)).await.unwrap();
        assert!(db_path.exists());
    }
}
