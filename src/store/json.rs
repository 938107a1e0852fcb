//! JSON-file snapshot store: write-then-rename saves, JSON-lines audit trail.

use std::{io, path::PathBuf};

use futures::future::BoxFuture;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use crate::store::{AuditRecord, SnapshotStore, StateSnapshot, StorageError, StorageResult};

/// Snapshot store backed by a JSON file on local disk. Saves go through a
/// temporary file and an atomic rename so a crash mid-write never corrupts
/// the snapshot.
pub struct JsonFileStore {
    path: PathBuf,
    audit_path: PathBuf,
}

impl JsonFileStore {
    /// Store writing the snapshot to `path` and the audit trail next to it.
    pub fn new(path: impl Into<PathBuf>, audit_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            audit_path: audit_path.into(),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<StateSnapshot>> {
        let path = self.path.clone();
        Box::pin(async move {
            let contents = match fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "no snapshot on disk; starting empty");
                    return Ok(StateSnapshot::default());
                }
                Err(err) => {
                    return Err(StorageError::unavailable(
                        format!("reading snapshot {}", path.display()),
                        err,
                    ));
                }
            };

            serde_json::from_str(&contents).map_err(|err| {
                StorageError::unavailable(format!("parsing snapshot {}", path.display()), err)
            })
        })
    }

    fn save(&self, snapshot: StateSnapshot) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        let tmp = self.tmp_path();
        Box::pin(async move {
            let payload = serde_json::to_vec_pretty(&snapshot).map_err(|err| {
                StorageError::unavailable("encoding snapshot".into(), err)
            })?;

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).await.map_err(|err| {
                        StorageError::unavailable(
                            format!("creating {}", parent.display()),
                            err,
                        )
                    })?;
                }
            }

            let mut file = fs::File::create(&tmp).await.map_err(|err| {
                StorageError::unavailable(format!("creating {}", tmp.display()), err)
            })?;
            file.write_all(&payload).await.map_err(|err| {
                StorageError::unavailable(format!("writing {}", tmp.display()), err)
            })?;
            file.sync_all().await.map_err(|err| {
                StorageError::unavailable(format!("syncing {}", tmp.display()), err)
            })?;

            fs::rename(&tmp, &path).await.map_err(|err| {
                StorageError::unavailable(
                    format!("renaming {} to {}", tmp.display(), path.display()),
                    err,
                )
            })
        })
    }

    fn append_audit(&self, record: AuditRecord) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.audit_path.clone();
        Box::pin(async move {
            let mut line = serde_json::to_vec(&record).map_err(|err| {
                StorageError::unavailable("encoding audit record".into(), err)
            })?;
            line.push(b'\n');

            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|err| {
                    StorageError::unavailable(format!("opening {}", path.display()), err)
                })?;
            file.write_all(&line).await.map_err(|err| {
                StorageError::unavailable(format!("appending {}", path.display()), err)
            })
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        Box::pin(async move {
            match fs::metadata(&path).await {
                Ok(_) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(StorageError::unavailable(
                    format!("checking {}", path.display()),
                    err,
                )),
            }
        })
    }
}
