//! Progressive-location challenges: ordered locations, timed zoomed-out clues.

use time::{Duration, OffsetDateTime};

use crate::{
    challenge::{ChallengeStrategy, StageAdvance, Verdict, hint_delay},
    state::{
        event::ChallengeConfig,
        progress::{StageState, Submission},
    },
};

/// N ordered locations. Screenshot evidence advances to the next location;
/// the hint timer reveals progressively zoomed-out clues for the current one
/// and, once clues are exhausted, moves on to the next location.
pub struct ProgressiveLocation;

impl ChallengeStrategy for ProgressiveLocation {
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
            return Verdict::reject("all locations have been found");
        }
        if !submission.has_attachment() {
            return Verdict::reject(
                "screenshot evidence is required for this challenge; text and links are not accepted",
            );
        }

        if stage.index >= config.stages {
            let next = StageState {
                complete: true,
                ..*stage
            };
            return Verdict::advance(next, format!("Location {} found — that was the last one!", stage.index));
        }

        let next = StageState {
            index: stage.index + 1,
            clue: 1,
            ..*stage
        };
        Verdict::advance(
            next,
            format!("Location {} found! Moving to location {}.", stage.index, stage.index + 1),
        )
    }

    fn advance_stage(&self, config: &ChallengeConfig, stage: &StageState) -> StageAdvance {
        if stage.complete {
            return StageAdvance::Complete;
        }
        if stage.clue < config.clues_per_stage {
            return StageAdvance::Advanced(StageState {
                clue: stage.clue + 1,
                ..*stage
            });
        }
        if stage.index < config.stages {
            return StageAdvance::Advanced(StageState {
                index: stage.index + 1,
                clue: 1,
                ..*stage
            });
        }
        StageAdvance::Complete
    }

    fn compute_score(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        _elapsed: Duration,
    ) -> i64 {
        let found = if stage.complete {
            config.stages
        } else {
            stage.index.saturating_sub(1)
        };
        config.base_points.saturating_mul(found as i64)
    }

    fn next_hint_due_at(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        now: OffsetDateTime,
    ) -> Option<OffsetDateTime> {
        if stage.complete {
            return None;
        }
        let more_clues = stage.clue < config.clues_per_stage;
        let more_locations = stage.index < config.stages;
        if more_clues || more_locations {
            Some(now + hint_delay(config))
        } else {
            None
        }
    }

    fn describe_stage(&self, config: &ChallengeConfig, stage: &StageState) -> Option<String> {
        if stage.complete {
            return None;
        }
        let base = config
            .stage_info
            .get(stage.index.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_else(|| format!("Location {}", stage.index));
        Some(format!(
            "{base} — clue {}/{} (submit a screenshot when you find it)",
            stage.clue, config.clues_per_stage
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(stages: u32, clues: u32) -> ChallengeConfig {
        ChallengeConfig {
            stages,
            clues_per_stage: clues,
            hint_delay_secs: Some(300),
            ..ChallengeConfig::default()
        }
    }

    #[test]
    fn text_evidence_is_rejected() {
        let cfg = config(3, 5);
        let stage = ProgressiveLocation.on_start(&cfg);
        let verdict =
            ProgressiveLocation.validate_evidence(&cfg, &stage, &Submission::text("it is here"));
        assert!(matches!(verdict, Verdict::Rejected { .. }));
    }

    #[test]
    fn attachment_advances_to_next_location() {
        let cfg = config(3, 5);
        let stage = ProgressiveLocation.on_start(&cfg);
        let Verdict::Accepted { next: Some(next), .. } = ProgressiveLocation.validate_evidence(
            &cfg,
            &stage,
            &Submission::attachment("attachment://a.png"),
        ) else {
            panic!("expected advance");
        };
        assert_eq!(next.index, 2);
        assert_eq!(next.clue, 1);
        assert!(!next.complete);
    }

    #[test]
    fn final_location_evidence_completes() {
        let cfg = config(2, 5);
        let stage = StageState {
            index: 2,
            ..StageState::default()
        };
        let Verdict::Accepted { next: Some(next), .. } = ProgressiveLocation.validate_evidence(
            &cfg,
            &stage,
            &Submission::attachment("attachment://b.png"),
        ) else {
            panic!("expected advance");
        };
        assert!(next.complete);
    }

    #[test]
    fn hint_walks_clues_then_locations() {
        let cfg = config(2, 2);
        let mut stage = ProgressiveLocation.on_start(&cfg);

        let mut path = Vec::new();
        loop {
            match ProgressiveLocation.advance_stage(&cfg, &stage) {
                StageAdvance::Advanced(next) => {
                    path.push((next.index, next.clue));
                    stage = next;
                }
                StageAdvance::Complete => break,
            }
        }
        assert_eq!(path, vec![(1, 2), (2, 1), (2, 2)]);
    }

    #[test]
    fn next_hint_stops_at_the_end() {
        let cfg = config(2, 2);
        let now = OffsetDateTime::now_utc();

        let first = ProgressiveLocation.on_start(&cfg);
        assert_eq!(
            ProgressiveLocation.next_hint_due_at(&cfg, &first, now),
            Some(now + Duration::seconds(300))
        );

        let last = StageState {
            index: 2,
            clue: 2,
            ..StageState::default()
        };
        assert_eq!(ProgressiveLocation.next_hint_due_at(&cfg, &last, now), None);

        let done = StageState {
            complete: true,
            ..last
        };
        assert_eq!(ProgressiveLocation.next_hint_due_at(&cfg, &done, now), None);
    }

    #[test]
    fn score_counts_found_locations() {
        let cfg = config(5, 1);
        let partway = StageState {
            index: 3,
            ..StageState::default()
        };
        assert_eq!(
            ProgressiveLocation.compute_score(&cfg, &partway, Duration::minutes(10)),
            200
        );

        let done = StageState {
            index: 5,
            complete: true,
            ..StageState::default()
        };
        assert_eq!(
            ProgressiveLocation.compute_score(&cfg, &done, Duration::minutes(10)),
            500
        );
    }
}
