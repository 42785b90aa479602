//! PageBot Memory - Bounded per-user conversation history.
//!
//! The store keeps an ordered sequence of timestamped turns per user:
//! - turns older than the retention window are pruned on every append and
//!   by a periodic sweep
//! - each user's history is capped, dropping oldest turns first
//! - the whole store is persisted as one JSON snapshot after each mutation
//!   and reloaded wholesale at startup
//!
//! Persistence failures degrade to in-memory operation; they are logged,
//! never propagated.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod snapshot;
pub mod store;

pub use snapshot::SnapshotFile;
pub use store::{ConversationStore, MemorySettings, Role, Turn};
