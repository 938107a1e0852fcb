//! Pluggable challenge behaviors behind a single capability trait.
//!
//! Every challenge kind implements [`ChallengeStrategy`]; the engine selects a
//! strategy by the definition's kind tag and never branches on the kind
//! anywhere else.

pub mod location;
pub mod minigame;
pub mod race;
pub mod speedrun;
pub mod trivia;

use time::{Duration, OffsetDateTime};

use crate::state::{
    event::{ChallengeConfig, ChallengeKind, ParticipantId},
    progress::{StageState, Submission},
};

pub use self::{
    location::ProgressiveLocation, minigame::Minigame, race::Race, speedrun::SpeedRun,
    trivia::Trivia,
};

/// Fallback delay between automatic hint advances when a challenge does not
/// configure one.
pub const DEFAULT_HINT_DELAY_SECS: u64 = 300;

/// Outcome of validating an evidence submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Evidence accepted; optionally advances the stage state.
    Accepted {
        /// Replacement stage state, if the submission moved the participant.
        next: Option<StageState>,
        /// Feedback line to relay to the participant.
        note: Option<String>,
    },
    /// Evidence rejected; the progress record must stay untouched.
    Rejected {
        /// Human-readable reason relayed to the participant.
        reason: String,
    },
}

impl Verdict {
    /// Accepted verdict with a stage change.
    pub fn advance(next: StageState, note: impl Into<String>) -> Self {
        Verdict::Accepted {
            next: Some(next),
            note: Some(note.into()),
        }
    }

    /// Rejected verdict with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Verdict::Rejected {
            reason: reason.into(),
        }
    }
}

/// Outcome of a timer- or skip-driven stage advance.
#[derive(Debug, Clone, PartialEq)]
pub enum StageAdvance {
    /// Moved to the given stage state.
    Advanced(StageState),
    /// No stage left to advance into.
    Complete,
}

/// A finisher's elapsed time, used for group-relative scoring.
#[derive(Debug, Clone, Copy)]
pub struct GroupFinish {
    /// Who finished.
    pub participant: ParticipantId,
    /// Time from start to finish.
    pub elapsed: Duration,
}

/// Capability set every challenge kind implements. The engine drives all
/// kinds uniformly through this trait.
pub trait ChallengeStrategy: Send + Sync {
    /// Initial stage state when a participant starts.
    fn on_start(&self, config: &ChallengeConfig) -> StageState;

    /// Validate a submission against the current stage. Rejection must leave
    /// no trace; acceptance may advance the stage.
    fn validate_evidence(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        submission: &Submission,
    ) -> Verdict;

    /// Advance one stage/clue, driven by the hint timer or a skip.
    fn advance_stage(&self, config: &ChallengeConfig, stage: &StageState) -> StageAdvance;

    /// Individual score for the stage state and elapsed time.
    fn compute_score(&self, config: &ChallengeConfig, stage: &StageState, elapsed: Duration)
    -> i64;

    /// When the next automatic hint advance is due, if the kind uses timed
    /// hints and any advance remains.
    fn next_hint_due_at(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        now: OffsetDateTime,
    ) -> Option<OffsetDateTime>;

    /// Text presented to the participant for the current stage.
    fn describe_stage(&self, _config: &ChallengeConfig, _stage: &StageState) -> Option<String> {
        None
    }

    /// Group-relative scores over all finishers, for kinds that rank the
    /// field instead of scoring individually.
    fn group_scores(
        &self,
        _config: &ChallengeConfig,
        _finishes: &[GroupFinish],
    ) -> Option<Vec<(ParticipantId, i64)>> {
        None
    }
}

/// Resolve the strategy for a challenge kind.
pub fn strategy_for(kind: ChallengeKind) -> &'static dyn ChallengeStrategy {
    match kind {
        ChallengeKind::Trivia => &Trivia,
        ChallengeKind::SpeedRun => &SpeedRun,
        ChallengeKind::Race => &Race,
        ChallengeKind::ProgressiveLocation => &ProgressiveLocation,
        ChallengeKind::Minigame => &Minigame,
    }
}

/// Effective hint delay for a challenge.
pub(crate) fn hint_delay(config: &ChallengeConfig) -> Duration {
    Duration::seconds(config.hint_delay_secs.unwrap_or(DEFAULT_HINT_DELAY_SECS) as i64)
}
