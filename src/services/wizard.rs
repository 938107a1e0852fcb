//! Step-by-step event setup dialog for admins.
//!
//! The wizard walks an admin through duration, release interval, name, and
//! announcement channel, re-prompting on invalid input. It produces an
//! [`EventDraft`] that the event service turns into a real event.

use time::Duration;

use crate::state::event::{ChannelId, GuildId};

/// Position within the setup dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    /// Asking for the overall event duration.
    Duration,
    /// Asking for the spacing between challenge releases.
    Interval,
    /// Asking for the event name.
    Name,
    /// Asking for the announcement channel.
    Channel,
}

/// Everything needed to create an event, as collected by the wizard.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    /// Display name.
    pub name: String,
    /// Guild the event belongs to.
    pub guild: GuildId,
    /// Announcement channel.
    pub channel: ChannelId,
    /// Overall event duration.
    pub duration: Duration,
    /// Spacing between consecutive challenge releases.
    pub release_interval: Duration,
}

/// Wizard response to one admin reply.
#[derive(Debug, Clone, PartialEq)]
pub enum WizardReply {
    /// Next question to ask.
    Prompt(String),
    /// The reply was not understood; same question again.
    Invalid(String),
    /// Dialog finished; the draft is ready.
    Complete(EventDraft),
}

/// An in-flight setup dialog for one admin.
#[derive(Debug, Clone)]
pub struct EventWizard {
    guild: GuildId,
    step: WizardStep,
    duration: Option<Duration>,
    interval: Option<Duration>,
    name: Option<String>,
}

impl EventWizard {
    /// Start a dialog for `guild`, returning the wizard and the first prompt.
    pub fn begin(guild: GuildId) -> (Self, String) {
        let wizard = Self {
            guild,
            step: WizardStep::Duration,
            duration: None,
            interval: None,
            name: None,
        };
        let prompt = "How long should the event run? (e.g. `7 days`)".to_string();
        (wizard, prompt)
    }

    /// Current step, for status displays.
    pub fn step(&self) -> WizardStep {
        self.step
    }

    /// Feed one admin reply into the dialog.
    pub fn handle_reply(&mut self, reply: &str) -> WizardReply {
        match self.step {
            WizardStep::Duration => match parse_duration(reply) {
                Some(duration) if duration.is_positive() => {
                    self.duration = Some(duration);
                    self.step = WizardStep::Interval;
                    WizardReply::Prompt(
                        "How far apart should challenges release? (e.g. `1 day`)".into(),
                    )
                }
                _ => WizardReply::Invalid(
                    "I could not read that as a duration. Try something like `7 days` or `12 hours`."
                        .into(),
                ),
            },
            WizardStep::Interval => match parse_duration(reply) {
                Some(interval) if interval.is_positive() => {
                    self.interval = Some(interval);
                    self.step = WizardStep::Name;
                    WizardReply::Prompt("What should the event be called?".into())
                }
                _ => WizardReply::Invalid(
                    "I could not read that as a duration. Try something like `1 day` or `90 minutes`."
                        .into(),
                ),
            },
            WizardStep::Name => {
                let name = reply.trim();
                if name.is_empty() {
                    WizardReply::Invalid("The event needs a name.".into())
                } else {
                    self.name = Some(name.to_string());
                    self.step = WizardStep::Channel;
                    WizardReply::Prompt(
                        "Which channel should announcements go to? (mention it or paste its id)"
                            .into(),
                    )
                }
            }
            WizardStep::Channel => match parse_channel(reply) {
                Some(channel) => {
                    // All previous steps are filled before this one is reached.
                    let (Some(duration), Some(release_interval), Some(name)) =
                        (self.duration, self.interval, self.name.clone())
                    else {
                        return WizardReply::Invalid("Setup got out of order; start over.".into());
                    };
                    WizardReply::Complete(EventDraft {
                        name,
                        guild: self.guild,
                        channel,
                        duration,
                        release_interval,
                    })
                }
                None => WizardReply::Invalid(
                    "I could not read that as a channel. Mention it like `<#1234>` or paste the id."
                        .into(),
                ),
            },
        }
    }
}

/// Parse a human duration like `7 days`, `12h`, or `1 day 6 hours`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let mut total = Duration::ZERO;
    let mut matched = false;
    let mut pending: Option<i64> = None;

    for token in text.split_whitespace() {
        match pending.take() {
            // Token must be the unit for the number before it.
            Some(amount) => {
                total += Duration::seconds(amount * unit_seconds(token)?);
                matched = true;
            }
            None => {
                if let Ok(amount) = token.parse::<i64>() {
                    pending = Some(amount);
                } else {
                    // Compact form like `7d` or `90m`.
                    let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
                    let unit = &token[digits.len()..];
                    let amount = digits.parse::<i64>().ok()?;
                    total += Duration::seconds(amount * unit_seconds(unit)?);
                    matched = true;
                }
            }
        }
    }

    if pending.is_some() || !matched {
        return None;
    }
    Some(total)
}

fn unit_seconds(unit: &str) -> Option<i64> {
    let unit = unit.trim_end_matches('s');
    match unit.to_ascii_lowercase().as_str() {
        "sec" | "second" => Some(1),
        "m" | "min" | "minute" => Some(60),
        "h" | "hr" | "hour" => Some(3_600),
        "d" | "day" => Some(86_400),
        "w" | "week" => Some(604_800),
        _ => None,
    }
}

/// Parse a channel reference: a chat mention like `<#1234>` or a bare id.
pub fn parse_channel(text: &str) -> Option<ChannelId> {
    let text = text.trim();
    let raw = text
        .strip_prefix("<#")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(text);
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spaced_and_compact_durations() {
        assert_eq!(parse_duration("7 days"), Some(Duration::days(7)));
        assert_eq!(parse_duration("12h"), Some(Duration::hours(12)));
        assert_eq!(parse_duration("90 minutes"), Some(Duration::minutes(90)));
        assert_eq!(
            parse_duration("1 day 6 hours"),
            Some(Duration::days(1) + Duration::hours(6))
        );
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("7"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn parses_channel_mentions_and_raw_ids() {
        assert_eq!(parse_channel("<#424242>"), Some(424242));
        assert_eq!(parse_channel("424242"), Some(424242));
        assert_eq!(parse_channel("#general"), None);
    }

    #[test]
    fn dialog_walks_to_a_complete_draft() {
        let (mut wizard, prompt) = EventWizard::begin(9);
        assert!(prompt.contains("How long"));

        assert!(matches!(
            wizard.handle_reply("2 weeks"),
            WizardReply::Prompt(_)
        ));
        assert!(matches!(wizard.handle_reply("1 day"), WizardReply::Prompt(_)));
        assert!(matches!(
            wizard.handle_reply("Summer Skirmish"),
            WizardReply::Prompt(_)
        ));

        match wizard.handle_reply("<#555>") {
            WizardReply::Complete(draft) => {
                assert_eq!(draft.name, "Summer Skirmish");
                assert_eq!(draft.guild, 9);
                assert_eq!(draft.channel, 555);
                assert_eq!(draft.duration, Duration::weeks(2));
                assert_eq!(draft.release_interval, Duration::days(1));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn invalid_input_reprompts_without_advancing() {
        let (mut wizard, _) = EventWizard::begin(9);
        assert!(matches!(
            wizard.handle_reply("until it gets boring"),
            WizardReply::Invalid(_)
        ));
        assert_eq!(wizard.step(), WizardStep::Duration);

        assert!(matches!(wizard.handle_reply("3 days"), WizardReply::Prompt(_)));
        assert_eq!(wizard.step(), WizardStep::Interval);
    }
}
