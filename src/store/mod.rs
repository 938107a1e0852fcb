//! Persistence boundary: snapshot store trait, backends, and the in-memory
//! progress table with atomic per-key updates.

pub mod json;
pub mod memory;
mod progress;

use std::error::Error;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::state::{
    event::{Event, ParticipantId},
    progress::ParticipantProgress,
};

pub use self::progress::{ProgressKey, ProgressStore};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying medium.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend failed or is unreachable.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What the backend was doing when it failed.
        message: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Full durable state: events with their challenge definitions, every
/// progress record, and known stats account names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// All known events.
    #[serde(default)]
    pub events: Vec<Event>,
    /// All progress records.
    #[serde(default)]
    pub progress: Vec<ParticipantProgress>,
    /// Registered stats account names per participant.
    #[serde(default)]
    pub accounts: Vec<(ParticipantId, String)>,
}

/// One entry of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the action happened.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// Acting participant, if the action was participant- or admin-driven.
    pub actor: Option<ParticipantId>,
    /// Short action name, e.g. `force_release`.
    pub action: String,
    /// Free-form detail.
    pub detail: String,
}

/// Abstraction over the persistence layer. `save` is durable on return; the
/// engine never advances timers past a mutation that has not committed.
pub trait SnapshotStore: Send + Sync {
    /// Load the full snapshot, empty when nothing was persisted yet.
    fn load(&self) -> BoxFuture<'static, StorageResult<StateSnapshot>>;
    /// Durably replace the snapshot.
    fn save(&self, snapshot: StateSnapshot) -> BoxFuture<'static, StorageResult<()>>;
    /// Append one audit record.
    fn append_audit(&self, record: AuditRecord) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap probe that the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
