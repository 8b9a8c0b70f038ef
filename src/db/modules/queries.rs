//! Module repository for database queries.

use super::models::{
    ModuleKind, ModuleManifest, ModulePermission, ModuleRecord, ModuleStatus, RegistryInvalidation,
};
use crate::db::DbError;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

/// Repository for module registry operations.
pub struct ModuleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ModuleRepository<'a> {
    /// Create a new module repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register (or re-register) a module from its manifest and attach it.
    ///
    /// Requested permissions are recorded ungranted; re-registration resets
    /// existing grants, so granting is always a fresh administrative act
    /// against the manifest actually installed.
    pub async fn register(
        &self,
        manifest: &ModuleManifest,
        kind: ModuleKind,
    ) -> Result<(ModuleRecord, RegistryInvalidation), DbError> {
        let now = chrono::Utc::now().timestamp();
        let manifest_json = serde_json::to_string(manifest)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO modules (module_id, kind, status, version, manifest,
                                 attached_at, created_at, updated_at)
            VALUES (?1, ?2, 'attached', ?3, ?4, ?5, ?5, ?5)
            ON CONFLICT(module_id) DO UPDATE SET
                kind = excluded.kind,
                status = 'attached',
                version = excluded.version,
                manifest = excluded.manifest,
                attached_at = excluded.attached_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&manifest.id)
        .bind(kind.as_str())
        .bind(&manifest.version)
        .bind(&manifest_json)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM module_permissions WHERE module_id = ?")
            .bind(&manifest.id)
            .execute(&mut *tx)
            .await?;

        for request in &manifest.permissions {
            sqlx::query(
                r#"
                INSERT INTO module_permissions (module_id, name, description, required, is_granted)
                VALUES (?, ?, ?, ?, 0)
                "#,
            )
            .bind(&manifest.id)
            .bind(&request.name)
            .bind(&request.description)
            .bind(request.required)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(module_id = %manifest.id, kind = %kind.as_str(), "Module registered");

        let record = self
            .find(&manifest.id)
            .await?
            .ok_or_else(|| DbError::Internal(format!("module {} vanished after register", manifest.id)))?;

        Ok((record, RegistryInvalidation(())))
    }

    /// Remove a module and its permission rows.
    pub async fn remove(&self, module_id: &str) -> Result<RegistryInvalidation, DbError> {
        let result = sqlx::query("DELETE FROM modules WHERE module_id = ?")
            .bind(module_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ModuleNotFound(module_id.to_string()));
        }

        tracing::info!(module_id = %module_id, "Module removed");
        Ok(RegistryInvalidation(()))
    }

    /// Change a module's operational status.
    pub async fn set_status(
        &self,
        module_id: &str,
        status: ModuleStatus,
    ) -> Result<RegistryInvalidation, DbError> {
        let now = chrono::Utc::now().timestamp();
        let attached_at = matches!(status, ModuleStatus::Attached).then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE modules
            SET status = ?2, attached_at = COALESCE(?3, attached_at), updated_at = ?4
            WHERE module_id = ?1
            "#,
        )
        .bind(module_id)
        .bind(status.as_str())
        .bind(attached_at)
        .bind(now)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ModuleNotFound(module_id.to_string()));
        }

        tracing::info!(module_id = %module_id, status = %status.as_str(), "Module status changed");
        Ok(RegistryInvalidation(()))
    }

    /// Grant a requested permission.
    pub async fn grant(
        &self,
        module_id: &str,
        name: &str,
    ) -> Result<RegistryInvalidation, DbError> {
        self.set_granted(module_id, name, true).await
    }

    /// Revoke a granted permission.
    pub async fn revoke(
        &self,
        module_id: &str,
        name: &str,
    ) -> Result<RegistryInvalidation, DbError> {
        self.set_granted(module_id, name, false).await
    }

    async fn set_granted(
        &self,
        module_id: &str,
        name: &str,
        is_granted: bool,
    ) -> Result<RegistryInvalidation, DbError> {
        let result = sqlx::query(
            "UPDATE module_permissions SET is_granted = ?3 WHERE module_id = ?1 AND name = ?2",
        )
        .bind(module_id)
        .bind(name)
        .bind(is_granted)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish "no such module" from "module never asked for this"
            if self.find(module_id).await?.is_none() {
                return Err(DbError::ModuleNotFound(module_id.to_string()));
            }
            return Err(DbError::PermissionNotDeclared {
                module_id: module_id.to_string(),
                name: name.to_string(),
            });
        }

        tracing::info!(
            module_id = %module_id,
            permission = %name,
            granted = is_granted,
            "Permission grant changed"
        );
        Ok(RegistryInvalidation(()))
    }

    /// Find a module by id, including its permission list.
    pub async fn find(&self, module_id: &str) -> Result<Option<ModuleRecord>, DbError> {
        let row: Option<ModuleRow> = sqlx::query_as(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules WHERE module_id = ?"
        ))
        .bind(module_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => {
                let permissions = self.fetch_permissions(module_id).await?;
                Ok(Some(record_from_row(row, permissions)?))
            }
            None => Ok(None),
        }
    }

    /// List all modules with their permission lists.
    pub async fn list(&self) -> Result<Vec<ModuleRecord>, DbError> {
        let rows: Vec<ModuleRow> = sqlx::query_as(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules ORDER BY module_id"
        ))
        .fetch_all(self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let permissions = self.fetch_permissions(&row.0).await?;
            records.push(record_from_row(row, permissions)?);
        }
        Ok(records)
    }

    /// The permission registry's load query: every attached module mapped to
    /// the set of its granted permission names (possibly empty).
    pub async fn attached_with_grants(
        &self,
    ) -> Result<HashMap<String, HashSet<String>>, DbError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT m.module_id, p.name
            FROM modules m
            LEFT JOIN module_permissions p
                ON p.module_id = m.module_id AND p.is_granted = 1
            WHERE m.status = 'attached'
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let mut map: HashMap<String, HashSet<String>> = HashMap::new();
        for (module_id, permission) in rows {
            let grants = map.entry(module_id).or_default();
            if let Some(name) = permission {
                grants.insert(name);
            }
        }
        Ok(map)
    }

    async fn fetch_permissions(&self, module_id: &str) -> Result<Vec<ModulePermission>, DbError> {
        let rows: Vec<(String, String, bool, bool)> = sqlx::query_as(
            r#"
            SELECT name, description, required, is_granted
            FROM module_permissions
            WHERE module_id = ?
            ORDER BY name
            "#,
        )
        .bind(module_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, description, required, is_granted)| ModulePermission {
                name,
                description,
                required,
                is_granted,
            })
            .collect())
    }
}

type ModuleRow = (
    String,         // module_id
    String,         // kind
    String,         // status
    String,         // version
    String,         // manifest (JSON)
    Option<i64>,    // attached_at
    i64,            // created_at
    i64,            // updated_at
);

const MODULE_COLUMNS: &str =
    "module_id, kind, status, version, manifest, attached_at, created_at, updated_at";

fn record_from_row(
    row: ModuleRow,
    permissions: Vec<ModulePermission>,
) -> Result<ModuleRecord, DbError> {
    let (module_id, kind, status, version, manifest, attached_at, created_at, updated_at) = row;

    Ok(ModuleRecord {
        module_id,
        kind: ModuleKind::parse(&kind)?,
        status: ModuleStatus::parse(&status)?,
        version,
        manifest: serde_json::from_str(&manifest)?,
        permissions,
        attached_at,
        created_at,
        updated_at,
    })
}
