//! In-memory snapshot store used by tests and ephemeral deployments.

use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;

use crate::store::{AuditRecord, SnapshotStore, StateSnapshot, StorageError, StorageResult};

#[derive(Debug)]
struct InjectedFailure;

impl fmt::Display for InjectedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "injected failure")
    }
}

impl std::error::Error for InjectedFailure {}

/// Snapshot store holding everything in process memory. Saves can be made to
/// fail on demand so persistence-failure paths are testable.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Arc<Mutex<StateSnapshot>>,
    audit: Arc<Mutex<Vec<AuditRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a snapshot.
    pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
            ..Self::default()
        }
    }

    /// Make every subsequent save/audit call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Audit records appended so far.
    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit.lock().expect("audit log poisoned").clone()
    }

    /// The snapshot as last saved.
    pub fn current(&self) -> StateSnapshot {
        self.snapshot.lock().expect("snapshot poisoned").clone()
    }

    fn check(&self, doing: &str) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(doing.into(), InjectedFailure))
        } else {
            Ok(())
        }
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<StateSnapshot>> {
        let result = self
            .check("loading snapshot")
            .map(|()| self.snapshot.lock().expect("snapshot poisoned").clone());
        Box::pin(async move { result })
    }

    fn save(&self, snapshot: StateSnapshot) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.check("saving snapshot").map(|()| {
            *self.snapshot.lock().expect("snapshot poisoned") = snapshot;
        });
        Box::pin(async move { result })
    }

    fn append_audit(&self, record: AuditRecord) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.check("appending audit record").map(|()| {
            self.audit.lock().expect("audit log poisoned").push(record);
        });
        Box::pin(async move { result })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.check("health check");
        Box::pin(async move { result })
    }
}
