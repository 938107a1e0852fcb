//! Timed multi-participant competition engine for chat communities.
//!
//! An event is an ordered set of challenges released on a schedule.
//! Participants join, start released challenges, and submit evidence over
//! direct messages; strategies per challenge kind validate evidence, advance
//! stages, reveal timed hints, and compute scores. All state mutations are
//! persisted before they are committed, so a restart recovers every pending
//! release, hint, and deadline.

pub mod challenge;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod store;
pub mod transport;
