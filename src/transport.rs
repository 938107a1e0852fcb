//! Boundaries to the chat platform and the external stats API.
//!
//! The engine only ever talks to these traits; the real platform bindings
//! live outside this crate. The logging implementations let the engine run
//! headless in development and in tests.

use futures::future::BoxFuture;
use tracing::info;
#[cfg(feature = "stats-http")]
use tracing::warn;

use crate::state::event::{ChannelId, ParticipantId};

/// Outbound messaging surface of the chat platform.
pub trait ChatTransport: Send + Sync {
    /// Post a message in a guild channel.
    fn announce(&self, channel: ChannelId, message: String) -> BoxFuture<'static, ()>;
    /// Send a direct message to a participant.
    fn send_direct(&self, participant: ParticipantId, message: String) -> BoxFuture<'static, ()>;
}

/// Transport that writes every message to the log instead of a chat platform.
pub struct LoggingTransport;

impl ChatTransport for LoggingTransport {
    fn announce(&self, channel: ChannelId, message: String) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            info!(channel, message = %message, "announce");
        })
    }

    fn send_direct(&self, participant: ParticipantId, message: String) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            info!(participant, message = %message, "direct message");
        })
    }
}

/// Result of a stats metric lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricLookup {
    /// The metric's current value.
    Value(f64),
    /// Rate-limited, unknown account, or backend failure. Score computation
    /// stays pending rather than failing the transition.
    Unavailable,
}

/// External game-stats lookup (hiscores-style API).
pub trait StatsClient: Send + Sync {
    /// Look up a numeric metric for an account.
    fn lookup_metric(&self, account: &str, metric: &str) -> BoxFuture<'static, MetricLookup>;
}

/// Stats client that reports every metric as unavailable.
pub struct NoopStatsClient;

impl StatsClient for NoopStatsClient {
    fn lookup_metric(&self, _account: &str, _metric: &str) -> BoxFuture<'static, MetricLookup> {
        Box::pin(async { MetricLookup::Unavailable })
    }
}

/// HTTP stats client for hiscores-style endpoints returning a bare number.
#[cfg(feature = "stats-http")]
pub struct HiscoreClient {
    http: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "stats-http")]
impl HiscoreClient {
    /// Client querying `{base_url}/{account}/{metric}`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[cfg(feature = "stats-http")]
impl StatsClient for HiscoreClient {
    fn lookup_metric(&self, account: &str, metric: &str) -> BoxFuture<'static, MetricLookup> {
        let url = format!("{}/{}/{}", self.base_url, account, metric);
        let http = self.http.clone();
        Box::pin(async move {
            let response = match http.get(&url).send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(url = %url, error = %err, "stats lookup failed");
                    return MetricLookup::Unavailable;
                }
            };
            if !response.status().is_success() {
                warn!(url = %url, status = %response.status(), "stats lookup rejected");
                return MetricLookup::Unavailable;
            }
            match response.text().await.map(|body| body.trim().parse::<f64>()) {
                Ok(Ok(value)) => MetricLookup::Value(value),
                Ok(Err(err)) => {
                    warn!(url = %url, error = %err, "stats response not numeric");
                    MetricLookup::Unavailable
                }
                Err(err) => {
                    warn!(url = %url, error = %err, "stats response unreadable");
                    MetricLookup::Unavailable
                }
            }
        })
    }
}
