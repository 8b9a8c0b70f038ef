//! State record storage: authoritative per-(session, participant) state
//! with an embedded time-bounded lock.

mod models;
mod queries;

pub use models::{SessionState, StateLock, StateMetadata, StateRecord, StateUpdate};
pub use queries::StateRepository;
