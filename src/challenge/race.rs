//! Race challenges: everyone gets the same brief, placement decides points.

use time::{Duration, OffsetDateTime};

use crate::{
    challenge::{ChallengeStrategy, GroupFinish, StageAdvance, Verdict},
    state::{
        event::{ChallengeConfig, ParticipantId},
        progress::{StageState, Submission},
    },
};

/// Single-objective challenge scored relative to the whole field: the first
/// finisher takes the full base points and later finishers a descending share.
pub struct Race;

impl ChallengeStrategy for Race {
    fn on_start(&self, _config: &ChallengeConfig) -> StageState {
        StageState::default()
    }

    fn validate_evidence(
        &self,
        _config: &ChallengeConfig,
        stage: &StageState,
        submission: &Submission,
    ) -> Verdict {
        if stage.complete {
            return Verdict::reject("proof already submitted");
        }
        let has_link = submission
            .text
            .split_whitespace()
            .any(|token| token.starts_with("http://") || token.starts_with("https://"));
        if !submission.has_attachment() && !has_link {
            return Verdict::reject("proof is required: attach a screenshot or include a link");
        }

        let next = StageState {
            complete: true,
            ..*stage
        };
        Verdict::advance(next, "Proof received — you can finish now.")
    }

    fn advance_stage(&self, _config: &ChallengeConfig, _stage: &StageState) -> StageAdvance {
        StageAdvance::Complete
    }

    fn compute_score(
        &self,
        _config: &ChallengeConfig,
        _stage: &StageState,
        _elapsed: Duration,
    ) -> i64 {
        // Individual score is zero; points come from the group ranking.
        0
    }

    fn next_hint_due_at(
        &self,
        _config: &ChallengeConfig,
        _stage: &StageState,
        _now: OffsetDateTime,
    ) -> Option<OffsetDateTime> {
        None
    }

    fn group_scores(
        &self,
        config: &ChallengeConfig,
        finishes: &[GroupFinish],
    ) -> Option<Vec<(ParticipantId, i64)>> {
        if finishes.is_empty() {
            return Some(Vec::new());
        }
        let mut ranked: Vec<GroupFinish> = finishes.to_vec();
        ranked.sort_by_key(|finish| finish.elapsed);

        let field = ranked.len() as i64;
        Some(
            ranked
                .iter()
                .enumerate()
                .map(|(rank, finish)| {
                    let points = config.base_points * (field - rank as i64) / field;
                    (finish.participant, points)
                })
                .collect(),
        )
    }
}
