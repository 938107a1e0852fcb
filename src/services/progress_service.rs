//! Participant progress operations: start, evidence, finish, timeouts,
//! hints, and skips.
//!
//! Every mutation goes through the progress store's atomic per-key update, so
//! a rejected submission or a failed persist leaves the committed record
//! untouched. Timer-driven entry points re-check the record's status inside
//! the update; a fire that arrives after the record went terminal surfaces as
//! a stale-fire error and is dropped by the dispatcher.

use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::{
    challenge::{StageAdvance, Verdict, strategy_for},
    error::ServiceError,
    scheduler::TimerId,
    state::{
        SharedState,
        event::{
            ChallengeDefinition, ChallengeId, Event, EventId, ParticipantId, ReleaseStatus,
        },
        progress::{
            ParticipantProgress, ProgressAction, ProgressStatus, StageState, Submission,
        },
    },
    store::ProgressKey,
    transport::MetricLookup,
};

/// Result of an accepted evidence submission.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceOutcome {
    /// Stage state after the submission.
    pub stage: StageState,
    /// Whether the submission moved the stage forward.
    pub advanced: bool,
    /// Strategy feedback to relay to the participant.
    pub note: Option<String>,
}

fn resolve(
    state: &SharedState,
    event_id: EventId,
    challenge_name: &str,
) -> Result<(Event, ChallengeDefinition), ServiceError> {
    let event = state
        .event(event_id)
        .ok_or_else(|| ServiceError::NotFound(format!("event `{event_id}` not found")))?;
    let def = event
        .challenge_by_name(challenge_name)
        .ok_or_else(|| ServiceError::NotFound(format!("challenge `{challenge_name}` not found")))?
        .clone();
    Ok((event, def))
}

fn resolve_by_id(
    state: &SharedState,
    participant: ParticipantId,
    challenge: ChallengeId,
) -> Result<(Event, ChallengeDefinition, ProgressKey), ServiceError> {
    let key = ProgressKey {
        participant,
        challenge,
    };
    let record = state
        .progress()
        .get(key)
        .ok_or_else(|| ServiceError::NotFound(format!("no progress for challenge `{challenge}`")))?;
    let event = state
        .event(record.event)
        .ok_or_else(|| ServiceError::NotFound(format!("event `{}` not found", record.event)))?;
    let def = event
        .challenge(challenge)
        .ok_or_else(|| ServiceError::NotFound(format!("challenge `{challenge}` not found")))?
        .clone();
    Ok((event, def, key))
}

/// Start a released challenge for a joined participant. Returns the opening
/// stage description, if the challenge kind presents one.
pub async fn start(
    state: &SharedState,
    event_id: EventId,
    participant: ParticipantId,
    challenge_name: &str,
) -> Result<Option<String>, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let (event, def) = resolve(state, event_id, challenge_name)?;

    if !event.is_open(now) {
        return Err(ServiceError::InvalidState(format!(
            "event `{}` is not running",
            event.name
        )));
    }
    if def.status != ReleaseStatus::Released {
        return Err(ServiceError::NotReleased(def.display_name.clone()));
    }
    if !event.participants.contains_key(&participant) {
        return Err(ServiceError::InvalidState(
            "join the event before starting challenges".into(),
        ));
    }

    let strategy = strategy_for(def.kind);
    let key = ProgressKey {
        participant,
        challenge: def.id,
    };
    let stage = state
        .update_progress(
            key,
            || ParticipantProgress::new(event.id, participant, def.id),
            |draft| {
                draft.ensure(ProgressAction::Start)?;
                draft.begin(strategy.on_start(&def.config), now);
                Ok(draft.stage)
            },
        )
        .await?;

    if let Some(secs) = def.config.duration_secs {
        state.scheduler().schedule_at(
            TimerId::Deadline {
                participant,
                challenge: def.id,
            },
            now + Duration::seconds(secs as i64),
        );
    }
    if let Some(due) = strategy.next_hint_due_at(&def.config, &stage, now) {
        state.scheduler().schedule_at(
            TimerId::Hint {
                participant,
                challenge: def.id,
            },
            due,
        );
    }

    info!(event = %event.id, challenge = %def.name, participant, "challenge started");
    Ok(strategy.describe_stage(&def.config, &stage))
}

/// Submit evidence for an active challenge.
///
/// Rejected evidence returns [`ServiceError::Rejected`] and leaves the record
/// exactly as it was, including the evidence log.
pub async fn submit_evidence(
    state: &SharedState,
    participant: ParticipantId,
    challenge: ChallengeId,
    submission: &Submission,
) -> Result<EvidenceOutcome, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let (event, def, key) = resolve_by_id(state, participant, challenge)?;

    if !event.is_open(now) {
        return Err(ServiceError::InvalidState(format!(
            "event `{}` is not running",
            event.name
        )));
    }

    let strategy = strategy_for(def.kind);
    let outcome = state
        .update_progress(
            key,
            || ParticipantProgress::new(event.id, participant, def.id),
            |draft| {
                draft.ensure(ProgressAction::Evidence)?;
                match strategy.validate_evidence(&def.config, &draft.stage, submission) {
                    Verdict::Rejected { reason } => Err(ServiceError::Rejected(reason)),
                    Verdict::Accepted { next, note } => {
                        let stage_index = draft.stage.index;
                        draft.evidence.extend(submission.records(stage_index, now));
                        let advanced = next.is_some();
                        if let Some(next) = next {
                            draft.advance(next, now);
                        }
                        Ok(EvidenceOutcome {
                            stage: draft.stage,
                            advanced,
                            note,
                        })
                    }
                }
            },
        )
        .await?;

    if outcome.stage.complete {
        // Nothing left to hint at.
        state.scheduler().cancel(&TimerId::Hint {
            participant,
            challenge,
        });
    } else if outcome.advanced {
        // The hint cadence restarts from the stage just reached.
        if let Some(due) = strategy.next_hint_due_at(&def.config, &outcome.stage, now) {
            state.scheduler().schedule_at(
                TimerId::Hint {
                    participant,
                    challenge,
                },
                due,
            );
        }
    }
    Ok(outcome)
}

/// Complete a challenge whose stage state has reached completion. Returns
/// the final accumulated score: the strategy's computed score plus whatever
/// the record already carried, so skip penalties stay applied.
///
/// When the challenge folds in an external stats metric, the lookup happens
/// before the record is locked; an unavailable backend leaves the score
/// marked pending instead of failing the transition.
pub async fn finish(
    state: &SharedState,
    participant: ParticipantId,
    challenge: ChallengeId,
) -> Result<i64, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let (event, def, key) = resolve_by_id(state, participant, challenge)?;
    let strategy = strategy_for(def.kind);

    let (metric_bonus, score_pending) = match &def.config.metric {
        Some(metric) => {
            let lookup = match state.account_for(participant) {
                Some(account) => state.stats().lookup_metric(&account, metric).await,
                None => MetricLookup::Unavailable,
            };
            match lookup {
                MetricLookup::Value(value) => (value as i64, false),
                MetricLookup::Unavailable => (0, true),
            }
        }
        None => (0, false),
    };

    let score = state
        .update_progress(
            key,
            || ParticipantProgress::new(event.id, participant, def.id),
            |draft| {
                draft.ensure(ProgressAction::Finish)?;
                if !draft.stage.complete {
                    return Err(ServiceError::InvalidState(format!(
                        "`{}` is not complete yet",
                        def.display_name
                    )));
                }
                let elapsed = now - draft.started_at.unwrap_or(now);
                let earned =
                    strategy.compute_score(&def.config, &draft.stage, elapsed) + metric_bonus;
                draft.complete(now, earned, score_pending);
                Ok(draft.score)
            },
        )
        .await?;

    state.scheduler().cancel(&TimerId::Hint {
        participant,
        challenge,
    });
    state.scheduler().cancel(&TimerId::Deadline {
        participant,
        challenge,
    });

    info!(challenge = %def.name, participant, score, "challenge finished");
    state
        .transport()
        .send_direct(
            participant,
            if score_pending {
                format!("**{}** complete! Score pending a stats lookup.", def.display_name)
            } else {
                format!("**{}** complete! You scored {score} points.", def.display_name)
            },
        )
        .await;
    Ok(score)
}

/// Deadline timer handler: mark an active record timed out, keeping the
/// partial score earned so far.
pub async fn time_out(
    state: &SharedState,
    participant: ParticipantId,
    challenge: ChallengeId,
) -> Result<(), ServiceError> {
    let now = OffsetDateTime::now_utc();
    let (event, def, key) = resolve_by_id(state, participant, challenge)?;
    let strategy = strategy_for(def.kind);

    state
        .update_progress(
            key,
            || ParticipantProgress::new(event.id, participant, def.id),
            |draft| {
                draft.ensure(ProgressAction::Timeout)?;
                let elapsed = now - draft.started_at.unwrap_or(now);
                let score = strategy.compute_score(&def.config, &draft.stage, elapsed);
                draft.time_out(now, score);
                Ok(())
            },
        )
        .await?;

    state.scheduler().cancel(&TimerId::Hint {
        participant,
        challenge,
    });

    info!(challenge = %def.name, participant, "challenge timed out");
    state
        .transport()
        .send_direct(
            participant,
            format!("Time is up for **{}**.", def.display_name),
        )
        .await;
    Ok(())
}

/// Hint timer handler: advance the stage/clue and schedule the next hint.
pub async fn advance_hint(
    state: &SharedState,
    participant: ParticipantId,
    challenge: ChallengeId,
) -> Result<(), ServiceError> {
    let now = OffsetDateTime::now_utc();
    let (event, def, key) = resolve_by_id(state, participant, challenge)?;
    let strategy = strategy_for(def.kind);

    let advanced = state
        .update_progress(
            key,
            || ParticipantProgress::new(event.id, participant, def.id),
            |draft| {
                draft.ensure(ProgressAction::Hint)?;
                match strategy.advance_stage(&def.config, &draft.stage) {
                    StageAdvance::Advanced(next) => {
                        draft.advance(next, now);
                        Ok(Some(next))
                    }
                    StageAdvance::Complete => Ok(None),
                }
            },
        )
        .await?;

    let Some(stage) = advanced else {
        return Ok(());
    };

    if let Some(text) = strategy.describe_stage(&def.config, &stage) {
        state.transport().send_direct(participant, text).await;
    }
    if let Some(due) = strategy.next_hint_due_at(&def.config, &stage, now) {
        state.scheduler().schedule_at(
            TimerId::Hint {
                participant,
                challenge,
            },
            due,
        );
    }
    Ok(())
}

/// Skip the current stage, paying the configured penalty. Skipping past the
/// final stage ends the challenge in the `Skipped` state.
pub async fn skip(
    state: &SharedState,
    participant: ParticipantId,
    challenge: ChallengeId,
) -> Result<ProgressStatus, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let (event, def, key) = resolve_by_id(state, participant, challenge)?;
    if !def.config.skip_allowed {
        return Err(ServiceError::InvalidState(format!(
            "`{}` does not allow skipping",
            def.display_name
        )));
    }

    let strategy = strategy_for(def.kind);
    let (status, stage) = state
        .update_progress(
            key,
            || ParticipantProgress::new(event.id, participant, def.id),
            |draft| {
                draft.ensure(ProgressAction::Skip)?;
                draft.score -= def.config.skip_penalty;

                // A skip jumps a whole stage, walking past any remaining
                // hint clues within the current one.
                let from = draft.stage.index;
                let mut cursor = draft.stage;
                loop {
                    match strategy.advance_stage(&def.config, &cursor) {
                        StageAdvance::Advanced(next) => {
                            cursor = next;
                            if cursor.index > from {
                                draft.advance(cursor, now);
                                break;
                            }
                        }
                        StageAdvance::Complete => {
                            draft.mark_skipped(now);
                            break;
                        }
                    }
                }
                Ok((draft.status, draft.stage))
            },
        )
        .await?;

    match status {
        ProgressStatus::Active => {
            if let Some(text) = strategy.describe_stage(&def.config, &stage) {
                state.transport().send_direct(participant, text).await;
            }
            if let Some(due) = strategy.next_hint_due_at(&def.config, &stage, now) {
                state.scheduler().schedule_at(
                    TimerId::Hint {
                        participant,
                        challenge,
                    },
                    due,
                );
            }
        }
        _ => {
            state.scheduler().cancel(&TimerId::Hint {
                participant,
                challenge,
            });
            state.scheduler().cancel(&TimerId::Deadline {
                participant,
                challenge,
            });
        }
    }

    info!(challenge = %def.name, participant, status = ?status, "stage skipped");
    Ok(status)
}
