//! Event and challenge definition records owned by the orchestrator.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Identifier of an event.
pub type EventId = Uuid;
/// Identifier of a challenge definition inside an event.
pub type ChallengeId = Uuid;
/// Chat-platform identifier of a participant.
pub type ParticipantId = u64;
/// Chat-platform identifier of a guild/community.
pub type GuildId = u64;
/// Chat-platform identifier of an announcement channel.
pub type ChannelId = u64;

/// Overall lifecycle of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Event is being assembled and is not visible to participants.
    Draft,
    /// Event is running: challenges release on schedule and progress is accepted.
    Active,
    /// Event is frozen; no further transitions are accepted.
    Concluded,
}

/// Release state of a single challenge definition. `Released` is monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// Not yet announced to participants.
    Pending,
    /// Announced and available to start.
    Released,
}

/// Type tag selecting the strategy that drives a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Question/answer rounds validated against configured answers.
    Trivia,
    /// Sequential clue stages where any submission advances; scored by elapsed time.
    SpeedRun,
    /// Everyone gets the same brief; scored relative to the group's finish times.
    Race,
    /// Ordered locations with timed, progressively zoomed-out hint clues.
    ProgressiveLocation,
    /// Custom win/lose condition checked against submissions.
    Minigame,
}

/// Expected answer for a trivia question, one variant per comparator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriviaAnswer {
    /// Normalized exact-text match.
    Exact(String),
    /// Multiple choice: a letter or the option text itself.
    Choice(String),
    /// Every listed item must be present, order-insensitive.
    List(Vec<String>),
    /// Items must appear in exactly this order.
    Ordered(Vec<String>),
}

/// A single trivia question with its expected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriviaQuestion {
    /// One-based question number; questions are asked in this order.
    pub number: u32,
    /// Text shown to the participant.
    pub prompt: String,
    /// Expected answer and comparator.
    pub answer: TriviaAnswer,
    /// Options for choice/ordered questions, labelled A, B, C, ... in order.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Type-specific configuration carried by a challenge definition. The core
/// only reads the timing fields; everything else is interpreted by the
/// challenge's strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Overall time limit once a participant starts, in seconds.
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Delay between automatic hint/stage advances, in seconds.
    #[serde(default)]
    pub hint_delay_secs: Option<u64>,
    /// Number of stages for staged challenge kinds.
    #[serde(default = "default_stages")]
    pub stages: u32,
    /// Hint clues available within each stage before the hint loop moves on.
    #[serde(default = "default_clues")]
    pub clues_per_stage: u32,
    /// Base score unit; each strategy decides how it is applied.
    #[serde(default = "default_points")]
    pub base_points: i64,
    /// Whether participants may skip a stage.
    #[serde(default)]
    pub skip_allowed: bool,
    /// Score penalty applied on each skip.
    #[serde(default)]
    pub skip_penalty: i64,
    /// Questions for trivia challenges.
    #[serde(default)]
    pub questions: Vec<TriviaQuestion>,
    /// Per-stage text shown when a stage is presented, indexed by stage.
    #[serde(default)]
    pub stage_info: Vec<String>,
    /// Winning phrase for minigame challenges.
    #[serde(default)]
    pub win_phrase: Option<String>,
    /// Stats metric to fold into the score on finish, if any.
    #[serde(default)]
    pub metric: Option<String>,
}

fn default_stages() -> u32 {
    1
}

fn default_clues() -> u32 {
    1
}

fn default_points() -> i64 {
    100
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            duration_secs: None,
            hint_delay_secs: None,
            stages: default_stages(),
            clues_per_stage: default_clues(),
            base_points: default_points(),
            skip_allowed: false,
            skip_penalty: 0,
            questions: Vec::new(),
            stage_info: Vec::new(),
            win_phrase: None,
            metric: None,
        }
    }
}

/// One timed activity within an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDefinition {
    /// Stable identifier.
    pub id: ChallengeId,
    /// Slug used in participant commands.
    pub name: String,
    /// Human readable name used in announcements.
    pub display_name: String,
    /// Strategy selector.
    pub kind: ChallengeKind,
    /// Strategy-specific configuration.
    pub config: ChallengeConfig,
    /// Explicit release offset from event start, in seconds. `None` falls
    /// back to the event's cadence.
    #[serde(default)]
    pub release_offset_secs: Option<u64>,
    /// Monotonic release state.
    pub status: ReleaseStatus,
    /// When the challenge was released, if it has been.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub released_at: Option<OffsetDateTime>,
}

/// How challenge releases are spaced when no explicit offset is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseCadence {
    /// Release the n-th challenge `n * secs` after event start.
    Interval {
        /// Spacing between consecutive releases, in seconds.
        secs: u64,
    },
    /// Every challenge carries its own explicit offset.
    Explicit,
}

/// A scheduled competition containing an ordered set of challenges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier.
    pub id: EventId,
    /// Display name.
    pub name: String,
    /// Guild/community the event belongs to.
    pub guild_id: GuildId,
    /// Channel where releases are announced.
    pub channel_id: ChannelId,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Release cadence for challenges without explicit offsets.
    pub cadence: ReleaseCadence,
    /// Challenge definitions in release order.
    pub challenges: Vec<ChallengeDefinition>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the event went active.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Overall event duration, applied as `ends_at` when the event starts.
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Hard end of the event.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    /// Participants and when they joined, in join order.
    #[serde(default)]
    pub participants: IndexMap<ParticipantId, OffsetDateTime>,
}

impl Event {
    /// Build a new draft event.
    pub fn new(
        name: String,
        guild_id: GuildId,
        channel_id: ChannelId,
        cadence: ReleaseCadence,
        challenges: Vec<ChallengeDefinition>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            guild_id,
            channel_id,
            status: EventStatus::Draft,
            cadence,
            challenges,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            duration_secs: None,
            ends_at: None,
            participants: IndexMap::new(),
        }
    }

    /// The first challenge still pending release, with its position.
    pub fn next_pending(&self) -> Option<(usize, &ChallengeDefinition)> {
        self.challenges
            .iter()
            .enumerate()
            .find(|(_, def)| def.status == ReleaseStatus::Pending)
    }

    /// Look up a challenge definition by id.
    pub fn challenge(&self, id: ChallengeId) -> Option<&ChallengeDefinition> {
        self.challenges.iter().find(|def| def.id == id)
    }

    /// Look up a challenge definition by its slug name.
    pub fn challenge_by_name(&self, name: &str) -> Option<&ChallengeDefinition> {
        self.challenges.iter().find(|def| def.name == name)
    }

    /// When the challenge at `index` is due for release. `None` until the
    /// event has started.
    pub fn release_due(&self, index: usize) -> Option<OffsetDateTime> {
        let start = self.started_at?;
        let def = self.challenges.get(index)?;
        let offset_secs = match def.release_offset_secs {
            Some(explicit) => explicit,
            None => match self.cadence {
                ReleaseCadence::Interval { secs } => secs.saturating_mul(index as u64),
                ReleaseCadence::Explicit => 0,
            },
        };
        Some(start + Duration::seconds(offset_secs as i64))
    }

    /// Whether the event currently accepts participant operations.
    pub fn is_open(&self, now: OffsetDateTime) -> bool {
        self.status == EventStatus::Active && self.ends_at.is_none_or(|end| now < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, offset: Option<u64>) -> ChallengeDefinition {
        ChallengeDefinition {
            id: Uuid::new_v4(),
            name: name.into(),
            display_name: name.into(),
            kind: ChallengeKind::Race,
            config: ChallengeConfig::default(),
            release_offset_secs: offset,
            status: ReleaseStatus::Pending,
            released_at: None,
        }
    }

    #[test]
    fn release_due_uses_explicit_offsets_over_cadence() {
        let mut event = Event::new(
            "test".into(),
            1,
            2,
            ReleaseCadence::Interval { secs: 3600 },
            vec![definition("a", None), definition("b", Some(600))],
        );
        let start = OffsetDateTime::now_utc();
        event.started_at = Some(start);

        assert_eq!(event.release_due(0), Some(start));
        assert_eq!(event.release_due(1), Some(start + Duration::seconds(600)));
    }

    #[test]
    fn release_due_is_none_before_start() {
        let event = Event::new(
            "test".into(),
            1,
            2,
            ReleaseCadence::Explicit,
            vec![definition("a", Some(0))],
        );
        assert_eq!(event.release_due(0), None);
    }

    #[test]
    fn next_pending_respects_definition_order() {
        let mut event = Event::new(
            "test".into(),
            1,
            2,
            ReleaseCadence::Explicit,
            vec![definition("a", Some(0)), definition("b", Some(60))],
        );
        assert_eq!(event.next_pending().map(|(i, _)| i), Some(0));

        event.challenges[0].status = ReleaseStatus::Released;
        assert_eq!(event.next_pending().map(|(i, _)| i), Some(1));

        event.challenges[1].status = ReleaseStatus::Released;
        assert!(event.next_pending().is_none());
    }
}
