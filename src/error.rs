//! Unified error handling for the veristate engine.
//!
//! Errors use symbolic kinds rather than transport status codes; mapping to
//! an outer transport (HTTP, RPC) is the caller's concern.

use crate::db::DbError;
use thiserror::Error;

/// Errors surfaced by the coordinator and the module API facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The calling module lacks a required permission. Fatal to the call,
    /// never retried automatically.
    #[error("module \"{module_id}\" lacks '{permission}' permission")]
    AuthorizationDenied {
        module_id: String,
        permission: &'static str,
    },

    /// A resolver attempted to write into a record locked by another
    /// module. Surfaced for manual escalation, not retried automatically.
    #[error("state locked by {holder}")]
    LockConflict { holder: String },

    /// A referenced session, participant or module does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The persistence collaborator failed. For facade operations the
    /// mailbox write is the hard failure boundary: if it fails, the call
    /// fails and no live delivery is attempted.
    #[error("storage error: {0}")]
    Db(#[from] DbError),
}

impl EngineError {
    /// Get a static error code string for log correlation.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied { .. } => "authorization_denied",
            Self::LockConflict { .. } => "lock_conflict",
            Self::NotFound(_) => "not_found",
            Self::Db(_) => "storage_failure",
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
