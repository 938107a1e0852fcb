//! Minigame challenges: a custom win condition checked against submissions.

use time::{Duration, OffsetDateTime};

use crate::{
    challenge::{ChallengeStrategy, StageAdvance, Verdict},
    state::{
        event::ChallengeConfig,
        progress::{StageState, Submission},
    },
};

/// Win/lose challenge: a submission containing the configured winning phrase
/// wins the full base points, anything else is logged and scores nothing.
pub struct Minigame;

impl ChallengeStrategy for Minigame {
    fn on_start(&self, _config: &ChallengeConfig) -> StageState {
        StageState::default()
    }

    fn validate_evidence(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        submission: &Submission,
    ) -> Verdict {
        if stage.complete {
            return Verdict::reject("the minigame is already won");
        }
        if submission.is_empty() {
            return Verdict::reject("send your result to be judged");
        }

        let won = config
            .win_phrase
            .as_deref()
            .is_some_and(|phrase| contains_phrase(&submission.text, phrase));
        if won {
            let next = StageState {
                complete: true,
                ..*stage
            };
            Verdict::advance(next, "Winning condition met!")
        } else {
            Verdict::Accepted {
                next: None,
                note: Some("Result recorded — not a win yet.".into()),
            }
        }
    }

    fn advance_stage(&self, _config: &ChallengeConfig, _stage: &StageState) -> StageAdvance {
        StageAdvance::Complete
    }

    fn compute_score(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        _elapsed: Duration,
    ) -> i64 {
        if stage.complete { config.base_points } else { 0 }
    }

    fn next_hint_due_at(
        &self,
        _config: &ChallengeConfig,
        _stage: &StageState,
        _now: OffsetDateTime,
    ) -> Option<OffsetDateTime> {
        None
    }
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.to_lowercase().contains(&phrase.to_lowercase())
}
