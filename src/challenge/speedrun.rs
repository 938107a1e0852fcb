//! Timed speed-run challenges: any reply advances, faster finishes score more.

use time::{Duration, OffsetDateTime};

use crate::{
    challenge::{ChallengeStrategy, StageAdvance, Verdict},
    state::{
        event::ChallengeConfig,
        progress::{StageState, Submission},
    },
};

/// Sequential clue stages where any non-empty reply counts as evidence and
/// moves the participant forward; the score is inverse in elapsed time.
pub struct SpeedRun;

impl ChallengeStrategy for SpeedRun {
    fn on_start(&self, config: &ChallengeConfig) -> StageState {
        StageState {
            complete: config.stages == 0,
            ..StageState::default()
        }
    }

    fn validate_evidence(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        submission: &Submission,
    ) -> Verdict {
        if stage.complete {
            return Verdict::reject("all stages are already complete");
        }
        if submission.is_empty() {
            return Verdict::reject("send a reply or attachment to advance");
        }

        if stage.index >= config.stages {
            let next = StageState {
                complete: true,
                ..*stage
            };
            return Verdict::advance(next, "All stages completed!");
        }
        let next = StageState {
            index: stage.index + 1,
            clue: 1,
            ..*stage
        };
        Verdict::advance(next, format!("Stage {} done.", stage.index))
    }

    fn advance_stage(&self, config: &ChallengeConfig, stage: &StageState) -> StageAdvance {
        if stage.complete || stage.index >= config.stages {
            StageAdvance::Complete
        } else {
            StageAdvance::Advanced(StageState {
                index: stage.index + 1,
                clue: 1,
                ..*stage
            })
        }
    }

    fn compute_score(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        elapsed: Duration,
    ) -> i64 {
        if !stage.complete {
            return 0;
        }
        let secs = elapsed.whole_seconds().max(1);
        config.base_points.saturating_mul(3600) / secs
    }

    fn next_hint_due_at(
        &self,
        _config: &ChallengeConfig,
        _stage: &StageState,
        _now: OffsetDateTime,
    ) -> Option<OffsetDateTime> {
        // Stages are revealed by submissions, not by a timer.
        None
    }

    fn describe_stage(&self, config: &ChallengeConfig, stage: &StageState) -> Option<String> {
        config
            .stage_info
            .get(stage.index.saturating_sub(1) as usize)
            .cloned()
    }
}
