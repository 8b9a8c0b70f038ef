//! Module registry database models.

use crate::db::DbError;
use serde::{Deserialize, Serialize};

/// Module kind.
///
/// Shields are continuous monitoring modules and request no privileged
/// permissions; features may request them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Shield,
    Feature,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shield => "shield",
            Self::Feature => "feature",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "shield" => Ok(Self::Shield),
            "feature" => Ok(Self::Feature),
            other => Err(DbError::InvalidStatus(other.to_string())),
        }
    }
}

/// Operational status of an installed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Attached,
    Detached,
    Error,
    PendingApproval,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::Error => "error",
            Self::PendingApproval => "pending_approval",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "attached" => Ok(Self::Attached),
            "detached" => Ok(Self::Detached),
            "error" => Ok(Self::Error),
            "pending_approval" => Ok(Self::PendingApproval),
            other => Err(DbError::InvalidStatus(other.to_string())),
        }
    }
}

/// A permission requested in a module manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Parsed module manifest, as registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionRequest>,
}

/// A requested permission together with its grant bit.
///
/// `is_granted` is the value the permission registry projects; it is an
/// administrative decision, never set by the module itself.
#[derive(Debug, Clone, Serialize)]
pub struct ModulePermission {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub is_granted: bool,
}

/// An installed module row with its permission list.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleRecord {
    pub module_id: String,
    pub kind: ModuleKind,
    pub status: ModuleStatus,
    pub version: String,
    pub manifest: serde_json::Value,
    pub permissions: Vec<ModulePermission>,
    pub attached_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Proof that effective grants may have changed.
///
/// Every grant-affecting mutation returns one; the holder must route it to
/// `PermissionRegistry::refresh` before the next state mutation is
/// admitted. Dropping it unreloaded leaves the cache stale for at most one
/// operation, the documented staleness bound.
#[must_use = "feed this to PermissionRegistry::refresh, or the cache diverges from persisted truth"]
#[derive(Debug)]
pub struct RegistryInvalidation(pub(crate) ());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parse_defaults() {
        let manifest: ModuleManifest = serde_json::from_str(
            r#"{
                "id": "mod.feature.chat",
                "version": "1.2.0",
                "permissions": [
                    { "name": "engine.state.update" },
                    { "name": "ui.notify", "required": false, "description": "toast access" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.id, "mod.feature.chat");
        assert!(manifest.description.is_none());
        assert_eq!(manifest.permissions.len(), 2);
        assert!(manifest.permissions[0].required);
        assert!(!manifest.permissions[1].required);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ModuleStatus::Attached,
            ModuleStatus::Detached,
            ModuleStatus::Error,
            ModuleStatus::PendingApproval,
        ] {
            assert_eq!(ModuleStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ModuleStatus::parse("sideways").is_err());
    }
}
