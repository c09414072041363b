//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer / forced check (admin API)
//!     → take a ticket from the registry
//!     → GET health URL under a timeout (2xx = healthy)
//!     → registry.update_health_with_ticket
//! ```
//!
//! # Design Decisions
//! - A probe result is applied only if no newer signal arrived meanwhile
//! - Probe failures are health transitions, never errors to callers
//! - One probe per instance per round, all rounds concurrent

pub mod active;

pub use active::HealthChecker;
