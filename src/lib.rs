//! veristate - session state consistency and module trust engine.
//!
//! Coordinates independent, least-privileged backend modules that
//! concurrently propose updates to shared per-participant state, and
//! guarantees store-and-forward delivery of module-issued notifications
//! and UI commands to intermittently connected participants.
//!
//! The three load-bearing pieces:
//! - [`registry::PermissionRegistry`] gates which modules may mutate
//!   authoritative state;
//! - [`coordinator::StateCoordinator`] arbitrates between the continuous
//!   aggregation process and authoritative resolver interventions via a
//!   per-record, time-bounded lock;
//! - the mailbox behind [`facade::ModuleApi`] degrades every outward
//!   module action into buffered delivery when the recipient is offline.

pub mod config;
pub mod coordinator;
pub mod db;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod facade;
pub mod registry;

pub use config::{Config, EngineConfig};
pub use coordinator::{SessionOverview, StateCoordinator};
pub use db::{Database, DbError, SessionState, StateMetadata, StateRecord, StateUpdate};
pub use delivery::{InProcessDelivery, LiveDelivery};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use facade::{ModuleApi, ModuleHandle, Note, NoteLevel, UiCommand};
pub use registry::{PermissionRegistry, perm};
