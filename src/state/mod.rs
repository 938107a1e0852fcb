//! Shared application state: the lifecycle-scoped context object every
//! component receives.

pub mod event;
pub mod progress;

use std::sync::Arc;

use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::{info, warn};

use crate::{
    challenge::strategy_for,
    config::AppConfig,
    error::ServiceError,
    scheduler::{Scheduler, TimerFire, TimerId},
    services::wizard::EventWizard,
    state::{
        event::{Event, EventId, EventStatus, GuildId, ParticipantId},
        progress::{ParticipantProgress, ProgressStatus},
    },
    store::{AuditRecord, ProgressKey, ProgressStore, SnapshotStore, StateSnapshot},
    transport::{ChatTransport, StatsClient},
};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state owning the event table, progress store,
/// scheduler, and collaborator handles.
pub struct AppState {
    config: AppConfig,
    store: RwLock<Option<Arc<dyn SnapshotStore>>>,
    /// Serializes snapshot persistence with its commit, so a snapshot
    /// written later always contains every earlier committed mutation.
    save_lock: Mutex<()>,
    degraded: watch::Sender<bool>,
    events: DashMap<EventId, Event>,
    event_locks: DashMap<EventId, Arc<Mutex<()>>>,
    progress: ProgressStore,
    scheduler: Arc<Scheduler>,
    transport: Arc<dyn ChatTransport>,
    stats: Arc<dyn StatsClient>,
    wizards: DashMap<ParticipantId, EventWizard>,
    accounts: DashMap<ParticipantId, String>,
}

impl AppState {
    /// Construct the shared state and the receiving end of the timer stream.
    ///
    /// The application starts in degraded mode until a snapshot store is
    /// installed. The caller is responsible for spawning
    /// [`Scheduler::run`] and the timer dispatch loop.
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn ChatTransport>,
        stats: Arc<dyn StatsClient>,
    ) -> (SharedState, mpsc::UnboundedReceiver<TimerFire>) {
        let (scheduler, timer_rx) = Scheduler::new();
        let (degraded_tx, _rx) = watch::channel(true);
        let state = Arc::new(Self {
            config,
            store: RwLock::new(None),
            save_lock: Mutex::new(()),
            degraded: degraded_tx,
            events: DashMap::new(),
            event_locks: DashMap::new(),
            progress: ProgressStore::new(),
            scheduler,
            transport,
            stats,
            wizards: DashMap::new(),
            accounts: DashMap::new(),
        });
        (state, timer_rx)
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current snapshot store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn SnapshotStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a snapshot store and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn SnapshotStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        let _ = self.degraded.send(false);
    }

    /// Remove the snapshot store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        let _ = self.degraded.send(true);
    }

    /// Whether the engine is running without a store.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Timer owner shared with the services.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Outbound chat transport.
    pub fn transport(&self) -> &dyn ChatTransport {
        self.transport.as_ref()
    }

    /// External stats API.
    pub fn stats(&self) -> &dyn StatsClient {
        self.stats.as_ref()
    }

    /// Progress table.
    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// In-flight event setup wizards keyed by admin.
    pub fn wizards(&self) -> &DashMap<ParticipantId, EventWizard> {
        &self.wizards
    }

    /// Register the stats account name for a participant.
    pub fn register_account(&self, participant: ParticipantId, account: String) {
        self.accounts.insert(participant, account);
    }

    /// Registered stats account for a participant, if any.
    pub fn account_for(&self, participant: ParticipantId) -> Option<String> {
        self.accounts.get(&participant).map(|entry| entry.clone())
    }

    /// A committed event by id.
    pub fn event(&self, id: EventId) -> Option<Event> {
        self.events.get(&id).map(|entry| entry.clone())
    }

    /// All committed events.
    pub fn events(&self) -> Vec<Event> {
        self.events.iter().map(|entry| entry.clone()).collect()
    }

    /// The non-concluded event of a guild, if one exists.
    pub fn open_event_for_guild(&self, guild: GuildId) -> Option<Event> {
        self.events
            .iter()
            .find(|entry| entry.guild_id == guild && entry.status != EventStatus::Concluded)
            .map(|entry| entry.clone())
    }

    /// Persist-then-commit a brand-new event.
    pub async fn insert_event(&self, event: Event) -> Result<(), ServiceError> {
        let _save = self.save_lock.lock().await;
        let lock = self
            .event_locks
            .entry(event.id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        self.save_snapshot(self.snapshot_with(Some(&event), None))
            .await?;
        self.events.insert(event.id, event);
        Ok(())
    }

    /// Atomically read-modify-write an event record. The mutated draft is
    /// durably persisted before it replaces the committed record.
    pub async fn update_event<T, M>(&self, id: EventId, mutate: M) -> Result<T, ServiceError>
    where
        M: FnOnce(&mut Event) -> Result<T, ServiceError>,
    {
        let _save = self.save_lock.lock().await;
        let lock = self
            .event_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let mut draft = self
            .event(id)
            .ok_or_else(|| ServiceError::NotFound(format!("event `{id}` not found")))?;
        let out = mutate(&mut draft)?;
        self.save_snapshot(self.snapshot_with(Some(&draft), None))
            .await?;
        let concluded = draft.status == EventStatus::Concluded;
        self.events.insert(id, draft);

        drop(guard);
        drop(lock);
        // Concluded events take no further mutations; their lock entry is
        // only pruned when no other task holds it.
        if concluded {
            self.event_locks
                .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        }
        Ok(out)
    }

    /// Atomically read-modify-write a progress record, creating it with
    /// `seed` when absent. See [`ProgressStore::update`].
    pub async fn update_progress<T, M>(
        &self,
        key: ProgressKey,
        seed: impl FnOnce() -> ParticipantProgress,
        mutate: M,
    ) -> Result<T, ServiceError>
    where
        M: FnOnce(&mut ParticipantProgress) -> Result<T, ServiceError>,
    {
        let _save = self.save_lock.lock().await;
        self.progress
            .update(key, seed, mutate, |draft| async move {
                self.save_snapshot(self.snapshot_with(None, Some(&draft)))
                    .await
            })
            .await
    }

    /// Current full snapshot of committed state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshot_with(None, None)
    }

    fn snapshot_with(
        &self,
        event_override: Option<&Event>,
        progress_override: Option<&ParticipantProgress>,
    ) -> StateSnapshot {
        let mut events = self.events();
        if let Some(draft) = event_override {
            match events.iter_mut().find(|event| event.id == draft.id) {
                Some(slot) => *slot = draft.clone(),
                None => events.push(draft.clone()),
            }
        }

        let mut progress = self.progress.all();
        if let Some(draft) = progress_override {
            let slot = progress.iter_mut().find(|record| {
                record.participant == draft.participant && record.challenge == draft.challenge
            });
            match slot {
                Some(slot) => *slot = draft.clone(),
                None => progress.push(draft.clone()),
            }
        }

        let accounts = self
            .accounts
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        StateSnapshot {
            events,
            progress,
            accounts,
        }
    }

    async fn save_snapshot(&self, snapshot: StateSnapshot) -> Result<(), ServiceError> {
        let Some(store) = self.store().await else {
            return Err(ServiceError::Degraded);
        };
        store.save(snapshot).await.map_err(Into::into)
    }

    /// Replace in-memory state from a persisted snapshot.
    pub fn load_from(&self, snapshot: StateSnapshot) {
        self.events.clear();
        for event in snapshot.events {
            self.events.insert(event.id, event);
        }
        self.progress.hydrate(snapshot.progress);
        self.accounts.clear();
        for (participant, account) in snapshot.accounts {
            self.accounts.insert(participant, account);
        }
    }

    /// Re-register every timer implied by the loaded state. Past-due timers
    /// fire immediately so a restart never skips a release or hint.
    pub fn rehydrate_timers(&self) {
        let now = OffsetDateTime::now_utc();
        let mut count = 0usize;

        for entry in self.events.iter() {
            let event = entry.value();
            if event.status != EventStatus::Active {
                continue;
            }
            if let Some((index, _)) = event.next_pending() {
                if let Some(due) = event.release_due(index) {
                    self.scheduler
                        .schedule_at(TimerId::Release { event: event.id }, due);
                    count += 1;
                }
            }
            if let Some(ends_at) = event.ends_at {
                self.scheduler
                    .schedule_at(TimerId::EventEnd { event: event.id }, ends_at);
                count += 1;
            }
        }

        for record in self.progress.all() {
            if record.status != ProgressStatus::Active {
                continue;
            }
            let Some(event) = self.event(record.event) else {
                warn!(challenge = %record.challenge, "active progress for unknown event; skipping timers");
                continue;
            };
            if event.status != EventStatus::Active {
                continue;
            }
            let Some(def) = event.challenge(record.challenge) else {
                warn!(challenge = %record.challenge, "active progress for unknown challenge; skipping timers");
                continue;
            };

            if let (Some(started), Some(duration_secs)) =
                (record.started_at, def.config.duration_secs)
            {
                self.scheduler.schedule_at(
                    TimerId::Deadline {
                        participant: record.participant,
                        challenge: record.challenge,
                    },
                    started + Duration::seconds(duration_secs as i64),
                );
                count += 1;
            }

            let strategy = strategy_for(def.kind);
            let base = record.last_hint_at.or(record.started_at).unwrap_or(now);
            if let Some(due) = strategy.next_hint_due_at(&def.config, &record.stage, base) {
                self.scheduler.schedule_at(
                    TimerId::Hint {
                        participant: record.participant,
                        challenge: record.challenge,
                    },
                    due,
                );
                count += 1;
            }
        }

        info!(timers = count, "rehydrated timers from persisted state");
    }

    /// Log an action to the audit trail. Audit failures are logged but never
    /// abort the audited operation.
    pub async fn audit(&self, actor: Option<ParticipantId>, action: &str, detail: String) {
        info!(actor = ?actor, action, detail = %detail, "audit");
        let Some(store) = self.store().await else {
            warn!(action, "no store installed; audit record dropped");
            return;
        };
        let record = AuditRecord {
            at: OffsetDateTime::now_utc(),
            actor,
            action: action.to_string(),
            detail,
        };
        if let Err(err) = store.append_audit(record).await {
            warn!(action, error = %err, "failed to append audit record");
        }
    }
}
