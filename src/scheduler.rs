//! One-shot wall-clock timers driving releases, hints, and deadlines.
//!
//! All due timers are delivered through a single channel so callbacks are
//! serialized: firing order is non-decreasing in due time with ties broken by
//! registration order, and no two fires for the same id overlap. Re-scheduling
//! an id replaces its previous registration; stale heap entries are discarded
//! when they surface.

use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap},
    sync::{Arc, Mutex},
};

use time::OffsetDateTime;
use tokio::{
    sync::{Notify, mpsc},
    time::Instant,
};
use tracing::trace;

use crate::state::event::{ChallengeId, EventId, ParticipantId};

/// Identity of a timer. Each id has at most one live registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Release of the next pending challenge of an event.
    Release {
        /// Owning event.
        event: EventId,
    },
    /// Hard end of an event.
    EventEnd {
        /// Owning event.
        event: EventId,
    },
    /// Next automatic hint advance for one participant's challenge.
    Hint {
        /// Owning participant.
        participant: ParticipantId,
        /// Challenge being played.
        challenge: ChallengeId,
    },
    /// Per-participant challenge deadline.
    Deadline {
        /// Owning participant.
        participant: ParticipantId,
        /// Challenge being played.
        challenge: ChallengeId,
    },
}

/// A due timer delivered to the dispatch stream.
#[derive(Debug, Clone)]
pub struct TimerFire {
    /// The timer that fired.
    pub id: TimerId,
    /// The originally requested due time.
    pub due: OffsetDateTime,
}

struct Entry {
    due_at: Instant,
    due: OffsetDateTime,
    seq: u64,
    id: TimerId,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_at, self.seq).cmp(&(other.due_at, other.seq))
    }
}

struct SchedulerInner {
    queue: BinaryHeap<Reverse<Entry>>,
    /// Live registration per id; an entry whose seq no longer matches is stale.
    live: HashMap<TimerId, u64>,
    seq: u64,
}

/// Owner of all pending timers.
pub struct Scheduler {
    inner: Mutex<SchedulerInner>,
    notify: Notify,
    tx: mpsc::UnboundedSender<TimerFire>,
}

impl Scheduler {
    /// Create a scheduler and the receiving end of its serialized fire stream.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TimerFire>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            inner: Mutex::new(SchedulerInner {
                queue: BinaryHeap::new(),
                live: HashMap::new(),
                seq: 0,
            }),
            notify: Notify::new(),
            tx,
        });
        (scheduler, rx)
    }

    /// Register (or replace) the one-shot timer for `id`. A due time in the
    /// past fires on the next scheduling tick.
    pub fn schedule_at(&self, id: TimerId, due: OffsetDateTime) {
        let delay = (due - OffsetDateTime::now_utc()).max(time::Duration::ZERO);
        let delay = std::time::Duration::try_from(delay).unwrap_or_default();
        let due_at = Instant::now() + delay;

        let mut inner = self.inner.lock().expect("scheduler state poisoned");
        inner.seq += 1;
        let seq = inner.seq;
        inner.live.insert(id.clone(), seq);
        inner.queue.push(Reverse(Entry { due_at, due, seq, id }));
        drop(inner);

        self.notify.notify_one();
    }

    /// Remove the pending timer for `id`. No-op if it is absent or has
    /// already fired.
    pub fn cancel(&self, id: &TimerId) {
        let mut inner = self.inner.lock().expect("scheduler state poisoned");
        inner.live.remove(id);
        drop(inner);
        self.notify.notify_one();
    }

    /// Whether `id` currently has a live registration.
    pub fn pending(&self, id: &TimerId) -> bool {
        self.inner
            .lock()
            .expect("scheduler state poisoned")
            .live
            .contains_key(id)
    }

    /// Drive the timer queue, pushing due fires into the stream. Runs until
    /// the process shuts down.
    pub async fn run(self: Arc<Self>) {
        loop {
            let next_due_at = {
                let mut inner = self.inner.lock().expect("scheduler state poisoned");
                loop {
                    let head = match inner.queue.peek() {
                        Some(Reverse(entry)) => {
                            let stale = inner.live.get(&entry.id) != Some(&entry.seq);
                            (entry.due_at, stale)
                        }
                        None => break None,
                    };

                    let (due_at, stale) = head;
                    if stale {
                        inner.queue.pop();
                        continue;
                    }
                    if due_at <= Instant::now() {
                        if let Some(Reverse(entry)) = inner.queue.pop() {
                            inner.live.remove(&entry.id);
                            trace!(id = ?entry.id, "timer due");
                            let _ = self.tx.send(TimerFire {
                                id: entry.id,
                                due: entry.due,
                            });
                        }
                        continue;
                    }
                    break Some(due_at);
                }
            };

            match next_due_at {
                Some(due_at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(due_at) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use uuid::Uuid;

    fn spawn(scheduler: &Arc<Scheduler>) {
        tokio::spawn(scheduler.clone().run());
    }

    fn release(event: EventId) -> TimerId {
        TimerId::Release { event }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_in_due_order_regardless_of_registration_order() {
        let (scheduler, mut rx) = Scheduler::new();
        spawn(&scheduler);

        let now = OffsetDateTime::now_utc();
        let late = Uuid::new_v4();
        let early = Uuid::new_v4();
        scheduler.schedule_at(release(late), now + Duration::seconds(20));
        scheduler.schedule_at(release(early), now + Duration::seconds(10));

        tokio::time::sleep(std::time::Duration::from_secs(21)).await;

        assert_eq!(rx.recv().await.unwrap().id, release(early));
        assert_eq!(rx.recv().await.unwrap().id, release(late));
    }

    #[tokio::test(start_paused = true)]
    async fn ties_break_by_registration_order() {
        let (scheduler, mut rx) = Scheduler::new();
        spawn(&scheduler);

        let now = OffsetDateTime::now_utc();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        scheduler.schedule_at(release(first), now + Duration::seconds(5));
        scheduler.schedule_at(release(second), now + Duration::seconds(5));

        tokio::time::sleep(std::time::Duration::from_secs(6)).await;

        assert_eq!(rx.recv().await.unwrap().id, release(first));
        assert_eq!(rx.recv().await.unwrap().id, release(second));
    }

    #[tokio::test(start_paused = true)]
    async fn past_due_timers_fire_immediately() {
        let (scheduler, mut rx) = Scheduler::new();
        spawn(&scheduler);

        let overdue = Uuid::new_v4();
        scheduler.schedule_at(release(overdue), OffsetDateTime::now_utc() - Duration::minutes(1));

        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        assert_eq!(rx.recv().await.unwrap().id, release(overdue));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_never_fire() {
        let (scheduler, mut rx) = Scheduler::new();
        spawn(&scheduler);

        let now = OffsetDateTime::now_utc();
        let cancelled = Uuid::new_v4();
        let kept = Uuid::new_v4();
        scheduler.schedule_at(release(cancelled), now + Duration::seconds(5));
        scheduler.schedule_at(release(kept), now + Duration::seconds(10));
        scheduler.cancel(&release(cancelled));
        assert!(!scheduler.pending(&release(cancelled)));

        tokio::time::sleep(std::time::Duration::from_secs(11)).await;

        assert_eq!(rx.recv().await.unwrap().id, release(kept));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_previous_registration() {
        let (scheduler, mut rx) = Scheduler::new();
        spawn(&scheduler);

        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        scheduler.schedule_at(release(id), now + Duration::seconds(5));
        scheduler.schedule_at(release(id), now + Duration::seconds(30));

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err(), "old registration must not fire");

        tokio::time::sleep(std::time::Duration::from_secs(21)).await;
        assert_eq!(rx.recv().await.unwrap().id, release(id));
    }
}
