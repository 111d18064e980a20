//! Request lifecycle tracking.
//!
//! # State Machine
//! ```text
//! pending --claim--> processing --complete--> completed
//!                    processing --fail-----> failed
//! pending --fail--------------------------> failed
//! ```
//!
//! # Design Decisions
//! - The tracker is the only writer of request state
//! - Each transition is a check-and-set under the entry's shard lock
//! - Terminal calls are idempotent for the same terminal state
//! - Terminal entries are evicted after a retention window by a janitor task

pub mod state;
pub mod tracker;

pub use state::{LifecycleError, RequestStatus, StateChange, StateCounts, Transition};
pub use tracker::LifecycleTracker;
