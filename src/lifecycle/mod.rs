//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build AppState → spawn background tasks → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → broadcast → join tasks → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when ready)
//! - Shutdown has a deadline: stuck tasks are aborted

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{BackgroundTasks, Shutdown};
pub use signals::wait_for_signal;
pub use startup::{start_background_tasks, Started};
