//! Scoped per-module storage.
//!
//! A `ScopedStore` is a transient capability bound to exactly one module
//! id. Collection names derived through it are always prefixed with that
//! id, so two modules can never collide on a shared namespace even when
//! they pick identical logical names. The handle exposes no way to
//! re-target the module id.

use crate::db::DbError;
use sqlx::SqlitePool;

/// Derive the physical collection name for a module's logical name.
///
/// Whitespace in the logical name is normalised to `_`; remaining
/// characters are whitelisted to keep the result a safe SQL identifier.
pub fn derive_collection_name(module_id: &str, logical_name: &str) -> String {
    let sanitize = |s: &str| {
        s.chars()
            .map(|c| {
                if c.is_whitespace() {
                    '_'
                } else if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>()
    };
    format!("{}_{}", sanitize(module_id), sanitize(logical_name))
}

/// A capability handle for one module's private collections.
pub struct ScopedStore<'a> {
    pool: &'a SqlitePool,
    module_id: String,
}

impl<'a> ScopedStore<'a> {
    pub(crate) fn new(pool: &'a SqlitePool, module_id: &str) -> Self {
        Self {
            pool,
            module_id: module_id.to_string(),
        }
    }

    /// The module id this handle is bound to.
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// The physical name this handle derives for a logical collection name.
    pub fn collection_name(&self, logical_name: &str) -> String {
        derive_collection_name(&self.module_id, logical_name)
    }

    fn table(&self, logical_name: &str) -> String {
        format!("\"scoped_{}\"", self.collection_name(logical_name))
    }

    /// Create the collection if it does not exist yet.
    pub async fn ensure_collection(&self, logical_name: &str) -> Result<(), DbError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            self.table(logical_name)
        ))
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace a value.
    pub async fn put(
        &self,
        logical_name: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?, ?, ?)",
            self.table(logical_name)
        ))
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a value by key.
    pub async fn get(
        &self,
        logical_name: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DbError> {
        let row: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT value FROM {} WHERE key = ?",
            self.table(logical_name)
        ))
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        row.map(|(value,)| serde_json::from_str(&value).map_err(DbError::from))
            .transpose()
    }

    /// Delete a key. Returns whether a row was removed.
    pub async fn delete(&self, logical_name: &str, key: &str) -> Result<bool, DbError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE key = ?",
            self.table(logical_name)
        ))
        .bind(key)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all keys in a collection.
    pub async fn keys(&self, logical_name: &str) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT key FROM {} ORDER BY key",
            self.table(logical_name)
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}
