//! Service layer: event orchestration, participant progress, admin
//! overrides, leaderboards, the setup wizard, and timer dispatch.

pub mod admin_service;
pub mod event_service;
pub mod leaderboard;
pub mod progress_service;
pub mod timer_dispatch;
pub mod wizard;
