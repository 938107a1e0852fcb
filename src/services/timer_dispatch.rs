//! Routes due timers from the scheduler stream to their service handlers.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    scheduler::{TimerFire, TimerId},
    services::{event_service, progress_service},
    state::SharedState,
};

/// Drain the timer stream, invoking the handler for each fire. Fires are
/// handled one at a time, so timer callbacks never overlap. Runs until the
/// scheduler is dropped.
pub async fn run(state: SharedState, mut rx: mpsc::UnboundedReceiver<TimerFire>) {
    while let Some(fire) = rx.recv().await {
        let result = match fire.id.clone() {
            TimerId::Release { event } => {
                event_service::release_next(&state, event, Some(fire.due))
                    .await
                    .map(|_| ())
            }
            TimerId::EventEnd { event } => event_service::conclude(&state, event, None).await,
            TimerId::Hint {
                participant,
                challenge,
            } => progress_service::advance_hint(&state, participant, challenge).await,
            TimerId::Deadline {
                participant,
                challenge,
            } => progress_service::time_out(&state, participant, challenge).await,
        };

        match result {
            Ok(()) => {}
            Err(err) if err.is_stale_fire() => {
                debug!(id = ?fire.id, error = %err, "dropping stale timer fire");
            }
            Err(err) => {
                warn!(id = ?fire.id, error = %err, "timer handler failed");
            }
        }
    }
}
