//! Per-participant challenge progress and its state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::state::event::{ChallengeId, EventId, ParticipantId};

/// Per-participant lifecycle of one challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// Joined the event but has not started this challenge.
    NotStarted,
    /// Currently working on the challenge.
    Active,
    /// Completed the challenge.
    Finished,
    /// The deadline elapsed before completion.
    TimedOut,
    /// Skipped out of the challenge past its final stage.
    Skipped,
}

impl ProgressStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProgressStatus::Finished | ProgressStatus::TimedOut | ProgressStatus::Skipped
        )
    }
}

/// Operations that can be applied to a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    /// Begin the challenge (requires it to be released).
    Start,
    /// Submit evidence for strategy validation.
    Evidence,
    /// Complete the challenge.
    Finish,
    /// Deadline elapsed.
    Timeout,
    /// Skip the current stage.
    Skip,
    /// Timer-driven hint/stage advance.
    Hint,
}

/// Error returned when an action is not legal from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {action:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the record was in when the action arrived.
    pub from: ProgressStatus,
    /// The rejected action.
    pub action: ProgressAction,
}

/// Strategy-maintained position within a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState {
    /// One-based stage index; never decreases.
    pub index: u32,
    /// One-based hint clue within the current stage.
    pub clue: u32,
    /// Correct submissions so far (trivia).
    pub correct: u32,
    /// Whether the strategy considers the challenge complete.
    pub complete: bool,
}

impl Default for StageState {
    fn default() -> Self {
        Self {
            index: 1,
            clue: 1,
            correct: 0,
            complete: false,
        }
    }
}

/// Kind of a single evidence submission entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Free text reply.
    Text,
    /// Link found in the reply.
    Url,
    /// Uploaded attachment reference.
    Attachment,
}

/// One entry in the append-only evidence log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// What kind of evidence this entry is.
    pub kind: EvidenceKind,
    /// Text content, URL, or attachment reference.
    pub content: String,
    /// Stage the participant was at when submitting.
    pub stage: u32,
    /// Submission timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

/// An inbound direct reply carrying evidence.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// Message text.
    pub text: String,
    /// Attachment references (URLs) included with the message.
    pub attachments: Vec<String>,
}

impl Submission {
    /// A text-only submission.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// A submission carrying one attachment reference.
    pub fn attachment(reference: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            attachments: vec![reference.into()],
        }
    }

    /// Whether the submission carries at least one attachment.
    pub fn has_attachment(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Whether the submission carries nothing usable.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }

    /// Expand the submission into evidence log entries for `stage`.
    pub fn records(&self, stage: u32, at: OffsetDateTime) -> Vec<EvidenceRecord> {
        let mut out = Vec::new();
        for reference in &self.attachments {
            out.push(EvidenceRecord {
                kind: EvidenceKind::Attachment,
                content: reference.clone(),
                stage,
                submitted_at: at,
            });
        }
        for token in self.text.split_whitespace() {
            if token.starts_with("http://") || token.starts_with("https://") {
                out.push(EvidenceRecord {
                    kind: EvidenceKind::Url,
                    content: token.to_string(),
                    stage,
                    submitted_at: at,
                });
            }
        }
        if !self.text.trim().is_empty() {
            out.push(EvidenceRecord {
                kind: EvidenceKind::Text,
                content: self.text.clone(),
                stage,
                submitted_at: at,
            });
        }
        out
    }
}

/// Progress of one participant through one challenge. The record is the
/// single source of truth; mutations happen only through the store's atomic
/// per-key update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantProgress {
    /// Event the challenge belongs to.
    pub event: EventId,
    /// Owning participant.
    pub participant: ParticipantId,
    /// Challenge being played.
    pub challenge: ChallengeId,
    /// Lifecycle status.
    pub status: ProgressStatus,
    /// Strategy-maintained stage position.
    pub stage: StageState,
    /// Set exactly once when the participant starts.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Set when the record reaches a terminal status.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    /// Last automatic hint advancement.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_hint_at: Option<OffsetDateTime>,
    /// Accumulated score.
    pub score: i64,
    /// Score could not be finalised because the stats lookup was unavailable.
    pub score_pending: bool,
    /// Append-only log of submissions.
    pub evidence: Vec<EvidenceRecord>,
}

impl ParticipantProgress {
    /// Fresh `NotStarted` record.
    pub fn new(event: EventId, participant: ParticipantId, challenge: ChallengeId) -> Self {
        Self {
            event,
            participant,
            challenge,
            status: ProgressStatus::NotStarted,
            stage: StageState::default(),
            started_at: None,
            finished_at: None,
            last_hint_at: None,
            score: 0,
            score_pending: false,
            evidence: Vec::new(),
        }
    }

    /// Validate that `action` is legal from the current status.
    pub fn ensure(&self, action: ProgressAction) -> Result<(), InvalidTransition> {
        let legal = match (self.status, action) {
            (ProgressStatus::NotStarted, ProgressAction::Start) => true,
            (ProgressStatus::Active, ProgressAction::Evidence)
            | (ProgressStatus::Active, ProgressAction::Finish)
            | (ProgressStatus::Active, ProgressAction::Timeout)
            | (ProgressStatus::Active, ProgressAction::Skip)
            | (ProgressStatus::Active, ProgressAction::Hint) => true,
            _ => false,
        };

        if legal {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    /// Transition to `Active`, seeding the stage state. `started_at` is set
    /// exactly once and immutable thereafter.
    pub fn begin(&mut self, stage: StageState, now: OffsetDateTime) {
        self.status = ProgressStatus::Active;
        self.stage = stage;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.last_hint_at = Some(now);
    }

    /// Advance the stage, enforcing that the index never decreases.
    pub fn advance(&mut self, next: StageState, now: OffsetDateTime) {
        debug_assert!(next.index >= self.stage.index);
        self.stage = next;
        self.last_hint_at = Some(now);
    }

    /// Transition to `Finished`, folding `score` into the accumulated total.
    /// Skip penalties charged along the way stay applied.
    pub fn complete(&mut self, now: OffsetDateTime, score: i64, score_pending: bool) {
        self.status = ProgressStatus::Finished;
        self.finished_at = Some(now);
        self.score += score;
        self.score_pending = score_pending;
    }

    /// Transition to `TimedOut`, folding the partial `score` earned so far
    /// into the accumulated total.
    pub fn time_out(&mut self, now: OffsetDateTime, score: i64) {
        self.status = ProgressStatus::TimedOut;
        self.finished_at = Some(now);
        self.score += score;
    }

    /// Transition to `Skipped`.
    pub fn mark_skipped(&mut self, now: OffsetDateTime) {
        self.status = ProgressStatus::Skipped;
        self.finished_at = Some(now);
    }

    /// Administrative reset back to `NotStarted`, clearing stage, score, and
    /// evidence. Bypasses the normal transition guards.
    pub fn reset(&mut self) {
        self.status = ProgressStatus::NotStarted;
        self.stage = StageState::default();
        self.started_at = None;
        self.finished_at = None;
        self.last_hint_at = None;
        self.score = 0;
        self.score_pending = false;
        self.evidence.clear();
    }
}
