//! Event lifecycle: creation, start, challenge releases, and conclusion.

use time::OffsetDateTime;
use tracing::info;

use crate::{
    error::ServiceError,
    scheduler::TimerId,
    services::{leaderboard, progress_service, wizard::EventDraft},
    state::{
        SharedState,
        event::{
            ChallengeDefinition, Event, EventId, EventStatus, ParticipantId, ReleaseCadence,
            ReleaseStatus,
        },
        progress::ProgressStatus,
    },
};

/// Create a draft event from a completed wizard draft, instantiating every
/// challenge template from the catalog in release order.
///
/// At most one non-concluded event may exist per guild.
pub async fn create_event(state: &SharedState, draft: EventDraft) -> Result<Event, ServiceError> {
    if let Some(existing) = state.open_event_for_guild(draft.guild) {
        return Err(ServiceError::InvalidState(format!(
            "event `{}` is still open in this guild",
            existing.name
        )));
    }
    if state.config().catalog.is_empty() {
        return Err(ServiceError::InvalidState(
            "no challenges configured; nothing to release".into(),
        ));
    }

    let challenges: Vec<ChallengeDefinition> = state
        .config()
        .catalog
        .iter()
        .map(|template| template.instantiate())
        .collect();

    let mut event = Event::new(
        draft.name,
        draft.guild,
        draft.channel,
        ReleaseCadence::Interval {
            secs: draft.release_interval.whole_seconds().max(0) as u64,
        },
        challenges,
    );
    event.duration_secs = Some(draft.duration.whole_seconds().max(0) as u64);

    state.insert_event(event.clone()).await?;
    info!(event = %event.id, name = %event.name, "event created");
    Ok(event)
}

/// Activate a draft event: stamp the start time, compute the hard end, and
/// schedule the first release and the event-end timer.
pub async fn start_event(
    state: &SharedState,
    event_id: EventId,
    actor: Option<ParticipantId>,
) -> Result<(), ServiceError> {
    let now = OffsetDateTime::now_utc();
    let event = state
        .update_event(event_id, |event| {
            if event.status != EventStatus::Draft {
                return Err(ServiceError::InvalidState(format!(
                    "event `{}` has already started",
                    event.name
                )));
            }
            event.status = EventStatus::Active;
            event.started_at = Some(now);
            event.ends_at = event
                .duration_secs
                .map(|secs| now + time::Duration::seconds(secs as i64));
            Ok(event.clone())
        })
        .await?;

    if let Some((index, _)) = event.next_pending() {
        if let Some(due) = event.release_due(index) {
            state
                .scheduler()
                .schedule_at(TimerId::Release { event: event.id }, due);
        }
    }
    if let Some(ends_at) = event.ends_at {
        state
            .scheduler()
            .schedule_at(TimerId::EventEnd { event: event.id }, ends_at);
    }

    state
        .transport()
        .announce(
            event.channel_id,
            format!("**{}** has begun! Type `join` to enter.", event.name),
        )
        .await;
    state
        .audit(actor, "start_event", format!("event {}", event.id))
        .await;
    Ok(())
}

/// Register a participant. Joining twice is a no-op; the join timestamp and
/// order are kept from the first join.
pub async fn join(
    state: &SharedState,
    event_id: EventId,
    participant: ParticipantId,
    account: Option<String>,
) -> Result<(), ServiceError> {
    let now = OffsetDateTime::now_utc();
    let already = state
        .update_event(event_id, |event| {
            if !event.is_open(now) {
                return Err(ServiceError::InvalidState(format!(
                    "event `{}` is not accepting participants",
                    event.name
                )));
            }
            if event.participants.contains_key(&participant) {
                return Ok(true);
            }
            event.participants.insert(participant, now);
            Ok(false)
        })
        .await?;

    if let Some(account) = account {
        state.register_account(participant, account);
    }
    if !already {
        info!(event = %event_id, participant, "participant joined");
    }
    Ok(())
}

/// Release the next pending challenge and schedule the one after it.
///
/// Fired by the release timer and by the admin force-release. Timer-driven
/// callers pass the fire's due time in `expected_due`; a fire whose due no
/// longer matches the next candidate's schedule refers to a release that
/// already happened (a force-release raced it) and is dropped. Returns the
/// released definition, or `None` when nothing was released.
pub async fn release_next(
    state: &SharedState,
    event_id: EventId,
    expected_due: Option<OffsetDateTime>,
) -> Result<Option<ChallengeDefinition>, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let released = state
        .update_event(event_id, |event| {
            if event.status != EventStatus::Active {
                return Ok(None);
            }
            let Some((index, _)) = event.next_pending() else {
                return Ok(None);
            };
            if expected_due.is_some() && event.release_due(index) != expected_due {
                return Ok(None);
            }
            let def = &mut event.challenges[index];
            def.status = ReleaseStatus::Released;
            def.released_at = Some(now);
            Ok(Some(def.clone()))
        })
        .await?;

    let Some(def) = released else {
        return Ok(None);
    };

    let event = state
        .event(event_id)
        .ok_or_else(|| ServiceError::NotFound(format!("event `{event_id}` not found")))?;
    if let Some((index, _)) = event.next_pending() {
        if let Some(due) = event.release_due(index) {
            state
                .scheduler()
                .schedule_at(TimerId::Release { event: event.id }, due);
        }
    }

    state
        .transport()
        .announce(
            event.channel_id,
            format!(
                "A new challenge is live: **{}**! Start it with `start {}`.",
                def.display_name, def.name
            ),
        )
        .await;
    info!(event = %event_id, challenge = %def.name, "challenge released");
    Ok(Some(def))
}

/// Admin override: release the next challenge now, regardless of schedule.
pub async fn force_release(
    state: &SharedState,
    event_id: EventId,
    actor: ParticipantId,
) -> Result<Option<ChallengeDefinition>, ServiceError> {
    state.scheduler().cancel(&TimerId::Release { event: event_id });
    let released = release_next(state, event_id, None).await?;
    let detail = match &released {
        Some(def) => format!("event {event_id}, challenge {}", def.name),
        None => format!("event {event_id}, nothing pending"),
    };
    state.audit(Some(actor), "force_release", detail).await;
    Ok(released)
}

/// Freeze the event: cancel its timers, time out every still-active
/// progress record, and announce the final standings.
pub async fn conclude(
    state: &SharedState,
    event_id: EventId,
    actor: Option<ParticipantId>,
) -> Result<(), ServiceError> {
    state
        .update_event(event_id, |event| {
            if event.status != EventStatus::Active {
                return Err(ServiceError::InvalidState(format!(
                    "event `{}` is not active",
                    event.name
                )));
            }
            event.status = EventStatus::Concluded;
            Ok(())
        })
        .await?;

    state.scheduler().cancel(&TimerId::Release { event: event_id });
    state.scheduler().cancel(&TimerId::EventEnd { event: event_id });

    // Anyone still mid-challenge is timed out with their partial score.
    for record in state.progress().for_event(event_id) {
        if record.status != ProgressStatus::Active {
            continue;
        }
        match progress_service::time_out(state, record.participant, record.challenge).await {
            Ok(()) => {}
            Err(err) if err.is_stale_fire() => {}
            Err(err) => return Err(err),
        }
    }

    let event = state
        .event(event_id)
        .ok_or_else(|| ServiceError::NotFound(format!("event `{event_id}` not found")))?;
    let records = state.progress().for_event(event_id);
    let rows = leaderboard::leaderboard(&event, &records);
    state
        .transport()
        .announce(
            event.channel_id,
            format!(
                "**{}** is over! Final {}",
                event.name,
                leaderboard::render(&event, &rows)
            ),
        )
        .await;
    state
        .audit(actor, "conclude", format!("event {event_id}"))
        .await;
    Ok(())
}
