//! Administrative overrides. These bypass the normal transition guards and
//! every use is written to the audit trail.

use time::OffsetDateTime;

use crate::{
    challenge::strategy_for,
    error::ServiceError,
    scheduler::TimerId,
    state::{
        SharedState,
        event::{ChallengeId, ParticipantId},
        progress::{ProgressStatus, StageState},
    },
    store::ProgressKey,
};

/// Reset a participant's progress on a challenge back to not-started,
/// clearing stage, score, and evidence. Their timers are cancelled.
pub async fn reset_progress(
    state: &SharedState,
    actor: ParticipantId,
    participant: ParticipantId,
    challenge: ChallengeId,
) -> Result<(), ServiceError> {
    let key = ProgressKey {
        participant,
        challenge,
    };
    let record = state
        .progress()
        .get(key)
        .ok_or_else(|| ServiceError::NotFound(format!("no progress for challenge `{challenge}`")))?;

    state
        .update_progress(key, move || record, |draft| {
            draft.reset();
            Ok(())
        })
        .await?;

    state.scheduler().cancel(&TimerId::Hint {
        participant,
        challenge,
    });
    state.scheduler().cancel(&TimerId::Deadline {
        participant,
        challenge,
    });

    state
        .audit(
            Some(actor),
            "reset_progress",
            format!("participant {participant}, challenge {challenge}"),
        )
        .await;
    Ok(())
}

/// Force a participant's stage position, reviving terminal records if
/// needed. The hint timer is restarted for the new stage.
pub async fn set_stage(
    state: &SharedState,
    actor: ParticipantId,
    participant: ParticipantId,
    challenge: ChallengeId,
    index: u32,
) -> Result<(), ServiceError> {
    let now = OffsetDateTime::now_utc();
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

    if index == 0 || index > def.config.stages.max(def.config.questions.len() as u32).max(1) {
        return Err(ServiceError::InvalidInput(format!(
            "stage {index} is out of range for `{}`",
            def.display_name
        )));
    }

    let stage = state
        .update_progress(key, move || record, |draft| {
            draft.status = ProgressStatus::Active;
            draft.finished_at = None;
            if draft.started_at.is_none() {
                draft.started_at = Some(now);
            }
            draft.stage = StageState {
                index,
                clue: 1,
                correct: draft.stage.correct,
                complete: false,
            };
            draft.last_hint_at = Some(now);
            Ok(draft.stage)
        })
        .await?;

    let strategy = strategy_for(def.kind);
    if let Some(due) = strategy.next_hint_due_at(&def.config, &stage, now) {
        state.scheduler().schedule_at(
            TimerId::Hint {
                participant,
                challenge,
            },
            due,
        );
    }

    state
        .audit(
            Some(actor),
            "set_stage",
            format!("participant {participant}, challenge {challenge}, stage {index}"),
        )
        .await;
    Ok(())
}
