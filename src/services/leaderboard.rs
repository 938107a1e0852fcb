//! Event leaderboard computed as a pure fold over progress records.

use std::collections::HashMap;

use time::OffsetDateTime;

use crate::{
    challenge::{GroupFinish, strategy_for},
    state::{
        event::{Event, ParticipantId},
        progress::{ParticipantProgress, ProgressStatus},
    },
};

/// One row of the event leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    /// Ranked participant.
    pub participant: ParticipantId,
    /// Total score across all challenges.
    pub score: i64,
    /// Challenges finished.
    pub finished: u32,
    /// At least one score is still awaiting a stats lookup.
    pub pending: bool,
}

/// Compute the leaderboard for `event` over the given progress records.
///
/// Individually scored challenges contribute the score stored on their
/// terminal records. Group-ranked challenges are re-scored over the full
/// field of finishers each time, so the ranking stays correct as finishers
/// come in. Ties break towards the participant who reached their final
/// completion earlier.
pub fn leaderboard(event: &Event, records: &[ParticipantProgress]) -> Vec<LeaderboardRow> {
    let mut scores: HashMap<ParticipantId, i64> = HashMap::new();
    let mut finished: HashMap<ParticipantId, u32> = HashMap::new();
    let mut pending: HashMap<ParticipantId, bool> = HashMap::new();
    let mut last_done: HashMap<ParticipantId, OffsetDateTime> = HashMap::new();

    for participant in event.participants.keys() {
        scores.insert(*participant, 0);
    }

    for def in &event.challenges {
        let strategy = strategy_for(def.kind);
        let challenge_records: Vec<&ParticipantProgress> = records
            .iter()
            .filter(|record| record.challenge == def.id)
            .collect();

        let finishes: Vec<GroupFinish> = challenge_records
            .iter()
            .filter(|record| record.status == ProgressStatus::Finished)
            .filter_map(|record| {
                let started = record.started_at?;
                let done = record.finished_at?;
                Some(GroupFinish {
                    participant: record.participant,
                    elapsed: done - started,
                })
            })
            .collect();

        let group = strategy.group_scores(&def.config, &finishes);

        for record in &challenge_records {
            if !record.status.is_terminal() {
                continue;
            }
            let entry = scores.entry(record.participant).or_insert(0);
            match &group {
                Some(ranked) => {
                    if let Some((_, points)) = ranked
                        .iter()
                        .find(|(participant, _)| *participant == record.participant)
                    {
                        *entry += points;
                    }
                }
                None => *entry += record.score,
            }

            if record.status == ProgressStatus::Finished {
                *finished.entry(record.participant).or_insert(0) += 1;
            }
            if record.score_pending {
                pending.insert(record.participant, true);
            }
            if let Some(done) = record.finished_at {
                let slot = last_done.entry(record.participant).or_insert(done);
                if done > *slot {
                    *slot = done;
                }
            }
        }
    }

    let mut rows: Vec<LeaderboardRow> = scores
        .into_iter()
        .map(|(participant, score)| LeaderboardRow {
            participant,
            score,
            finished: finished.get(&participant).copied().unwrap_or(0),
            pending: pending.get(&participant).copied().unwrap_or(false),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| {
                let far = OffsetDateTime::now_utc() + time::Duration::days(365 * 100);
                let a_done = last_done.get(&a.participant).copied().unwrap_or(far);
                let b_done = last_done.get(&b.participant).copied().unwrap_or(far);
                a_done.cmp(&b_done)
            })
            .then_with(|| a.participant.cmp(&b.participant))
    });
    rows
}

/// Render the leaderboard as announcement text.
pub fn render(event: &Event, rows: &[LeaderboardRow]) -> String {
    let mut out = format!("**{}** standings:\n", event.name);
    if rows.is_empty() {
        out.push_str("no participants yet");
        return out;
    }
    for (rank, row) in rows.iter().enumerate() {
        let pending = if row.pending { " (score pending)" } else { "" };
        out.push_str(&format!(
            "{}. <@{}> — {} points, {} finished{}\n",
            rank + 1,
            row.participant,
            row.score,
            row.finished,
            pending,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::event::{
        ChallengeConfig, ChallengeDefinition, ChallengeKind, ReleaseCadence, ReleaseStatus,
    };
    use time::Duration;
    use uuid::Uuid;

    fn definition(kind: ChallengeKind, base_points: i64) -> ChallengeDefinition {
        ChallengeDefinition {
            id: Uuid::new_v4(),
            name: "c".into(),
            display_name: "C".into(),
            kind,
            config: ChallengeConfig {
                base_points,
                ..ChallengeConfig::default()
            },
            release_offset_secs: Some(0),
            status: ReleaseStatus::Released,
            released_at: None,
        }
    }

    fn finished(
        event: &Event,
        def: &ChallengeDefinition,
        participant: u64,
        score: i64,
        elapsed_secs: i64,
    ) -> ParticipantProgress {
        let start = OffsetDateTime::now_utc() - Duration::hours(1);
        let mut record = ParticipantProgress::new(event.id, participant, def.id);
        record.status = ProgressStatus::Finished;
        record.started_at = Some(start);
        record.finished_at = Some(start + Duration::seconds(elapsed_secs));
        record.score = score;
        record
    }

    #[test]
    fn sums_individual_scores_and_ranks_by_total() {
        let trivia = definition(ChallengeKind::Trivia, 100);
        let mut event = Event::new(
            "e".into(),
            1,
            2,
            ReleaseCadence::Explicit,
            vec![trivia.clone()],
        );
        let now = OffsetDateTime::now_utc();
        event.participants.insert(10, now);
        event.participants.insert(11, now);

        let records = vec![
            finished(&event, &trivia, 10, 300, 60),
            finished(&event, &trivia, 11, 500, 90),
        ];
        let rows = leaderboard(&event, &records);

        assert_eq!(rows[0].participant, 11);
        assert_eq!(rows[0].score, 500);
        assert_eq!(rows[1].participant, 10);
        assert_eq!(rows[1].score, 300);
    }

    #[test]
    fn group_ranked_challenges_rescore_over_the_field() {
        let race = definition(ChallengeKind::Race, 300);
        let mut event = Event::new(
            "e".into(),
            1,
            2,
            ReleaseCadence::Explicit,
            vec![race.clone()],
        );
        let now = OffsetDateTime::now_utc();
        for participant in [10, 11, 12] {
            event.participants.insert(participant, now);
        }

        // Stored per-record scores are zero for group-ranked kinds; the
        // leaderboard derives points from relative finish times.
        let records = vec![
            finished(&event, &race, 10, 0, 300),
            finished(&event, &race, 11, 0, 60),
            finished(&event, &race, 12, 0, 120),
        ];
        let rows = leaderboard(&event, &records);

        assert_eq!(rows[0].participant, 11);
        assert_eq!(rows[0].score, 300);
        assert_eq!(rows[1].participant, 12);
        assert_eq!(rows[1].score, 200);
        assert_eq!(rows[2].participant, 10);
        assert_eq!(rows[2].score, 100);
    }

    #[test]
    fn ties_break_towards_the_earlier_finisher() {
        let trivia = definition(ChallengeKind::Trivia, 100);
        let mut event = Event::new(
            "e".into(),
            1,
            2,
            ReleaseCadence::Explicit,
            vec![trivia.clone()],
        );
        let now = OffsetDateTime::now_utc();
        event.participants.insert(10, now);
        event.participants.insert(11, now);

        let records = vec![
            finished(&event, &trivia, 10, 400, 600),
            finished(&event, &trivia, 11, 400, 60),
        ];
        let rows = leaderboard(&event, &records);
        assert_eq!(rows[0].participant, 11);
        assert_eq!(rows[1].participant, 10);
    }

    #[test]
    fn participants_without_records_appear_with_zero() {
        let trivia = definition(ChallengeKind::Trivia, 100);
        let mut event = Event::new("e".into(), 1, 2, ReleaseCadence::Explicit, vec![trivia]);
        event
            .participants
            .insert(10, OffsetDateTime::now_utc());

        let rows = leaderboard(&event, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 0);
        assert_eq!(rows[0].finished, 0);
    }
}
