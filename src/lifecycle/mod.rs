//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → workers, result listener and janitor exit their loops
//!     → message bus closed → Coordinator::shutdown joins the tasks
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One broadcast signal; every long-running task subscribes before it is spawned
//! - A request already claimed by a worker runs to a terminal state before the worker exits

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
