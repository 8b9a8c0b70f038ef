//! Installed module records and permission grants.
//!
//! These rows are the source of truth for the in-process permission
//! registry; the registry is only ever a cache over them.

mod models;
mod queries;

pub use models::{
    ModuleKind, ModuleManifest, ModulePermission, ModuleRecord, ModuleStatus, PermissionRequest,
    RegistryInvalidation,
};
pub use queries::ModuleRepository;
