//! Concurrent progress table with atomic, serialized per-key updates.

use std::{future::Future, sync::Arc};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    error::ServiceError,
    state::{
        event::{ChallengeId, EventId, ParticipantId},
        progress::ParticipantProgress,
    },
};

/// Key of one progress record. Distinct participants never contend on the
/// same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    /// Owning participant.
    pub participant: ParticipantId,
    /// Challenge being played.
    pub challenge: ChallengeId,
}

/// Committed progress records plus a per-key mutex serializing mutations.
///
/// An update clones the committed record, applies the mutation to the draft,
/// runs the caller's persist step, and only then commits the draft — so a
/// failed mutation or persist leaves the committed state untouched.
#[derive(Default)]
pub struct ProgressStore {
    records: DashMap<ProgressKey, ParticipantProgress>,
    locks: DashMap<ProgressKey, Arc<Mutex<()>>>,
}

impl ProgressStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table contents from a persisted snapshot.
    pub fn hydrate(&self, records: Vec<ParticipantProgress>) {
        self.records.clear();
        for record in records {
            let key = ProgressKey {
                participant: record.participant,
                challenge: record.challenge,
            };
            self.records.insert(key, record);
        }
    }

    /// Committed record for `key`, if any.
    pub fn get(&self, key: ProgressKey) -> Option<ParticipantProgress> {
        self.records.get(&key).map(|record| record.clone())
    }

    /// All committed records.
    pub fn all(&self) -> Vec<ParticipantProgress> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All committed records belonging to `event`.
    pub fn for_event(&self, event: EventId) -> Vec<ParticipantProgress> {
        self.records
            .iter()
            .filter(|entry| entry.value().event == event)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Atomically read-modify-write the record for `key`.
    ///
    /// `seed` builds the record if none exists yet, `mutate` applies the
    /// change to a draft, and `persist` must durably commit the draft before
    /// it replaces the in-memory record. Operations on the same key are
    /// strictly serialized; other keys proceed independently.
    pub async fn update<T, M, P, Fut>(
        &self,
        key: ProgressKey,
        seed: impl FnOnce() -> ParticipantProgress,
        mutate: M,
        persist: P,
    ) -> Result<T, ServiceError>
    where
        M: FnOnce(&mut ParticipantProgress) -> Result<T, ServiceError>,
        P: FnOnce(ParticipantProgress) -> Fut,
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let mut draft = self.get(key).unwrap_or_else(seed);
        let out = mutate(&mut draft)?;
        persist(draft.clone()).await?;
        let terminal = draft.status.is_terminal();
        self.records.insert(key, draft);

        drop(guard);
        drop(lock);
        if terminal {
            self.prune_lock(key);
        }
        Ok(out)
    }

    /// Remove the record for `key`, returning it. Administrative use only.
    pub fn remove(&self, key: ProgressKey) -> Option<ParticipantProgress> {
        let removed = self.records.remove(&key).map(|(_, record)| record);
        self.prune_lock(key);
        removed
    }

    /// Drop the lock entry for `key` unless another task still holds it.
    /// An admin override on a terminal record simply re-creates the entry.
    fn prune_lock(&self, key: ProgressKey) {
        self.locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn key() -> (EventId, ProgressKey) {
        let event = Uuid::new_v4();
        (
            event,
            ProgressKey {
                participant: 1,
                challenge: Uuid::new_v4(),
            },
        )
    }

    #[tokio::test]
    async fn failed_mutation_leaves_no_record() {
        let store = ProgressStore::new();
        let (event, k) = key();

        let result: Result<(), ServiceError> = store
            .update(
                k,
                || ParticipantProgress::new(event, k.participant, k.challenge),
                |_| Err(ServiceError::InvalidInput("nope".into())),
                |_| async { Ok(()) },
            )
            .await;
        assert!(result.is_err());
        assert!(store.get(k).is_none());
    }

    #[tokio::test]
    async fn failed_persist_leaves_committed_state_untouched() {
        let store = ProgressStore::new();
        let (event, k) = key();

        store
            .update(
                k,
                || ParticipantProgress::new(event, k.participant, k.challenge),
                |draft| {
                    draft.score = 10;
                    Ok(())
                },
                |_| async { Ok(()) },
            )
            .await
            .unwrap();

        let result: Result<(), ServiceError> = store
            .update(
                k,
                || unreachable!("record exists"),
                |draft| {
                    draft.score = 99;
                    Ok(())
                },
                |_| async { Err(ServiceError::Degraded) },
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(k).unwrap().score, 10);
    }

    #[tokio::test]
    async fn updates_on_the_same_key_are_serialized() {
        let store = Arc::new(ProgressStore::new());
        let (event, k) = key();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(
                        k,
                        || ParticipantProgress::new(event, k.participant, k.challenge),
                        |draft| {
                            draft.score += 1;
                            Ok(())
                        },
                        |_| async { Ok(()) },
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.get(k).unwrap().score, 20);
    }

    #[tokio::test]
    async fn terminal_records_release_their_lock_entry() {
        use time::OffsetDateTime;

        use crate::state::progress::{ProgressStatus, StageState};

        let store = ProgressStore::new();
        let (event, k) = key();
        let now = OffsetDateTime::now_utc();

        store
            .update(
                k,
                || ParticipantProgress::new(event, k.participant, k.challenge),
                |draft| {
                    draft.begin(StageState::default(), now);
                    Ok(())
                },
                |_| async { Ok(()) },
            )
            .await
            .unwrap();
        assert!(store.locks.contains_key(&k));

        store
            .update(
                k,
                || unreachable!("record exists"),
                |draft| {
                    draft.time_out(now, 0);
                    Ok(())
                },
                |_| async { Ok(()) },
            )
            .await
            .unwrap();
        assert!(!store.locks.contains_key(&k));
        assert_eq!(store.get(k).unwrap().status, ProgressStatus::TimedOut);

        store.remove(k);
        assert!(!store.locks.contains_key(&k));
        assert!(store.get(k).is_none());
    }
}
