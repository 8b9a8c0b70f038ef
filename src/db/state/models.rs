//! State record database models.

use crate::db::DbError;
use serde::{Deserialize, Serialize};

/// The authoritative validation state of a participant within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Satisfied,
    NotSatisfied,
    Suspicious,
    PartiallySatisfied,
    NotApplicable,
}

impl SessionState {
    /// Database/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::NotSatisfied => "not_satisfied",
            Self::Suspicious => "suspicious",
            Self::PartiallySatisfied => "partially_satisfied",
            Self::NotApplicable => "not_applicable",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "satisfied" => Ok(Self::Satisfied),
            "not_satisfied" => Ok(Self::NotSatisfied),
            "suspicious" => Ok(Self::Suspicious),
            "partially_satisfied" => Ok(Self::PartiallySatisfied),
            "not_applicable" => Ok(Self::NotApplicable),
            other => Err(DbError::InvalidState(other.to_string())),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::NotApplicable
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contextual payload attached to a state.
///
/// Modelled as a tagged union over the known shapes with an opaque escape
/// hatch, so modules with private shapes stay forward-compatible without
/// giving up type safety where the shape is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateMetadata {
    /// Partial satisfaction, e.g. `{ value: 75.0, unit: "percent" }`.
    Partial { value: f64, unit: String },
    /// Free-text context for Suspicious / NotApplicable states.
    Reason { reason: String },
    /// Module-private payload.
    Opaque { data: serde_json::Value },
}

/// The embedded mutual-exclusion lock of a state record.
///
/// Expiry is evaluated lazily on access; an expired lock is never
/// proactively cleared.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateLock {
    pub held: bool,
    pub holder: Option<String>,
    pub locked_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub reason: Option<String>,
}

impl StateLock {
    /// Whether the lock is held and not yet expired at `now`.
    ///
    /// A held lock with no expiry cannot be produced through the API, but a
    /// hand-edited row still fails safe (treated as active).
    pub fn is_active(&self, now: i64) -> bool {
        self.held && self.expires_at.is_none_or(|e| e > now)
    }

    /// Whether the lock blocks a write from `module_id` at `now`.
    pub fn blocks(&self, module_id: &str, now: i64) -> bool {
        self.is_active(now) && self.holder.as_deref() != Some(module_id)
    }
}

/// One live state record per (session, participant).
#[derive(Debug, Clone, Serialize)]
pub struct StateRecord {
    pub session_id: String,
    pub participant_id: String,
    pub current_state: SessionState,
    pub state_metadata: Option<StateMetadata>,
    pub last_updated_by: String,
    pub lock: StateLock,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A proposed state mutation. Last-writer-wins at the field level; there is
/// no merge of concurrent metadata.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub state: SessionState,
    pub metadata: Option<StateMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_round_trip() {
        for state in [
            SessionState::Satisfied,
            SessionState::NotSatisfied,
            SessionState::Suspicious,
            SessionState::PartiallySatisfied,
            SessionState::NotApplicable,
        ] {
            assert_eq!(SessionState::parse(state.as_str()).unwrap(), state);
        }
        assert!(SessionState::parse("bogus").is_err());
    }

    #[test]
    fn test_metadata_tagging() {
        let meta = StateMetadata::Partial {
            value: 75.0,
            unit: "percent".into(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"kind\":\"partial\""));
        let back: StateMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);

        let opaque = StateMetadata::Opaque {
            data: serde_json::json!({"gps": [1.0, 2.0]}),
        };
        let json = serde_json::to_string(&opaque).unwrap();
        let back: StateMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opaque);
    }

    #[test]
    fn test_lock_expiry_is_lazy() {
        let lock = StateLock {
            held: true,
            holder: Some("mod.resolver.fraud".into()),
            locked_at: Some(100),
            expires_at: Some(200),
            reason: None,
        };
        assert!(lock.is_active(150));
        assert!(!lock.is_active(200));
        assert!(lock.blocks("mod.aggregator", 150));
        assert!(!lock.blocks("mod.resolver.fraud", 150));
        assert!(!lock.blocks("mod.aggregator", 250));
    }
}
