//! Trivia challenges: ordered questions validated by per-question comparators.

use time::{Duration, OffsetDateTime};

use crate::{
    challenge::{ChallengeStrategy, StageAdvance, Verdict},
    state::{
        event::{ChallengeConfig, TriviaAnswer, TriviaQuestion},
        progress::{StageState, Submission},
    },
};

/// Question/answer challenge. Every answer, right or wrong, is recorded and
/// moves the participant to the next question; the score counts correct
/// answers.
pub struct Trivia;

impl Trivia {
    fn question<'a>(config: &'a ChallengeConfig, number: u32) -> Option<&'a TriviaQuestion> {
        config.questions.iter().find(|q| q.number == number)
    }
}

impl ChallengeStrategy for Trivia {
    fn on_start(&self, config: &ChallengeConfig) -> StageState {
        StageState {
            complete: config.questions.is_empty(),
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
            return Verdict::reject("all questions have been answered");
        }
        if submission.text.trim().is_empty() {
            return Verdict::reject("an answer is required");
        }
        let Some(question) = Self::question(config, stage.index) else {
            return Verdict::reject(format!("no question at stage {}", stage.index));
        };

        let correct = matches(&submission.text, question);
        let next = StageState {
            index: stage.index + 1,
            clue: 1,
            correct: stage.correct + u32::from(correct),
            complete: Self::question(config, stage.index + 1).is_none(),
        };
        let note = if correct { "Correct!" } else { "Incorrect." };

        Verdict::advance(next, note)
    }

    fn advance_stage(&self, config: &ChallengeConfig, stage: &StageState) -> StageAdvance {
        if stage.complete {
            return StageAdvance::Complete;
        }
        match Self::question(config, stage.index + 1) {
            Some(_) => StageAdvance::Advanced(StageState {
                index: stage.index + 1,
                clue: 1,
                ..*stage
            }),
            None => StageAdvance::Complete,
        }
    }

    fn compute_score(
        &self,
        config: &ChallengeConfig,
        stage: &StageState,
        _elapsed: Duration,
    ) -> i64 {
        config.base_points.saturating_mul(stage.correct as i64)
    }

    fn next_hint_due_at(
        &self,
        _config: &ChallengeConfig,
        _stage: &StageState,
        _now: OffsetDateTime,
    ) -> Option<OffsetDateTime> {
        // Questions are delivered on submission, not on a timer.
        None
    }

    fn describe_stage(&self, config: &ChallengeConfig, stage: &StageState) -> Option<String> {
        let question = Self::question(config, stage.index)?;
        let mut text = format!("Question {}: {}", question.number, question.prompt);
        for (position, option) in question.options.iter().enumerate() {
            let letter = (b'A' + (position % 26) as u8) as char;
            text.push_str(&format!("\n{letter}. {option}"));
        }
        Some(text)
    }
}

/// Check a raw reply against a question's comparator.
pub fn matches(reply: &str, question: &TriviaQuestion) -> bool {
    match &question.answer {
        TriviaAnswer::Exact(expected) => normalize(reply) == normalize(expected),
        TriviaAnswer::Choice(expected) => {
            resolve_choice(reply, &question.options) == normalize(expected)
        }
        TriviaAnswer::List(expected) => {
            let mut given = parse_items(reply, &question.options);
            let mut wanted: Vec<String> = expected.iter().map(|item| normalize(item)).collect();
            given.sort();
            wanted.sort();
            given == wanted
        }
        TriviaAnswer::Ordered(expected) => {
            let given = parse_items(reply, &question.options);
            let wanted: Vec<String> = expected.iter().map(|item| normalize(item)).collect();
            given == wanted
        }
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Resolve a reply that may be an option letter ("b") or the option text.
fn resolve_choice(reply: &str, options: &[String]) -> String {
    let normalized = normalize(reply);
    if normalized.len() == 1 {
        if let Some(letter) = normalized.chars().next() {
            let position = (letter as u32).wrapping_sub('a' as u32) as usize;
            if let Some(option) = options.get(position) {
                return normalize(option);
            }
        }
    }
    normalized
}

/// Split a reply into normalized items, mapping single letters to options.
fn parse_items(reply: &str, options: &[String]) -> Vec<String> {
    reply
        .split(|c: char| c == ',' || c == ';' || c == '\n')
        .map(|item| resolve_choice(item, options))
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(answer: TriviaAnswer, options: &[&str]) -> TriviaQuestion {
        TriviaQuestion {
            number: 1,
            prompt: "?".into(),
            answer,
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn config(questions: Vec<TriviaQuestion>) -> ChallengeConfig {
        ChallengeConfig {
            questions,
            ..ChallengeConfig::default()
        }
    }

    #[test]
    fn exact_match_ignores_case_and_punctuation() {
        let q = question(TriviaAnswer::Exact("Wise Old Man".into()), &[]);
        assert!(matches("wise old man", &q));
        assert!(matches("  Wise, Old Man! ", &q));
        assert!(!matches("wise young man", &q));
    }

    #[test]
    fn choice_accepts_letter_or_text() {
        let q = question(
            TriviaAnswer::Choice("Falador".into()),
            &["Lumbridge", "Falador", "Varrock"],
        );
        assert!(matches("b", &q));
        assert!(matches("B", &q));
        assert!(matches("falador", &q));
        assert!(!matches("a", &q));
        assert!(!matches("varrock", &q));
    }

    #[test]
    fn list_is_order_insensitive_and_exact() {
        let q = question(
            TriviaAnswer::List(vec!["bronze".into(), "iron".into(), "steel".into()]),
            &[],
        );
        assert!(matches("steel, bronze, iron", &q));
        assert!(!matches("steel, bronze", &q));
        assert!(!matches("steel, bronze, iron, rune", &q));
    }

    #[test]
    fn ordered_requires_sequence() {
        let q = question(
            TriviaAnswer::Ordered(vec!["first".into(), "second".into(), "third".into()]),
            &[],
        );
        assert!(matches("first, second, third", &q));
        assert!(!matches("third, second, first", &q));
    }

    #[test]
    fn ordered_accepts_option_letters() {
        let q = question(
            TriviaAnswer::Ordered(vec!["red".into(), "green".into()]),
            &["green", "red"],
        );
        assert!(matches("b, a", &q));
        assert!(!matches("a, b", &q));
    }

    #[test]
    fn answers_advance_and_count_correct() {
        let cfg = config(vec![
            TriviaQuestion {
                number: 1,
                prompt: "?".into(),
                answer: TriviaAnswer::Exact("yes".into()),
                options: vec![],
            },
            TriviaQuestion {
                number: 2,
                prompt: "?".into(),
                answer: TriviaAnswer::Exact("no".into()),
                options: vec![],
            },
        ]);

        let stage = Trivia.on_start(&cfg);
        assert!(!stage.complete);

        let Verdict::Accepted { next, note } =
            Trivia.validate_evidence(&cfg, &stage, &Submission::text("yes"))
        else {
            panic!("expected accepted verdict");
        };
        let stage = next.unwrap();
        assert_eq!(stage.correct, 1);
        assert_eq!(note.as_deref(), Some("Correct!"));

        let Verdict::Accepted { next, note } =
            Trivia.validate_evidence(&cfg, &stage, &Submission::text("wrong"))
        else {
            panic!("expected accepted verdict");
        };
        let stage = next.unwrap();
        assert_eq!(stage.correct, 1);
        assert!(stage.complete);
        assert_eq!(note.as_deref(), Some("Incorrect."));

        assert_eq!(Trivia.compute_score(&cfg, &stage, Duration::minutes(3)), 100);
    }

    #[test]
    fn evidence_after_completion_is_rejected() {
        let cfg = config(vec![TriviaQuestion {
            number: 1,
            prompt: "?".into(),
            answer: TriviaAnswer::Exact("yes".into()),
            options: vec![],
        }]);
        let stage = StageState {
            index: 2,
            complete: true,
            ..StageState::default()
        };
        assert!(matches!(
            Trivia.validate_evidence(&cfg, &stage, &Submission::text("yes")),
            Verdict::Rejected { .. }
        ));
    }
}
