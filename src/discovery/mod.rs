//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Backend heartbeat.rs → set_with_ttl("service:<name>:<id>", record)
//!                             ↓
//!                   KeyValueStore (Redis / memory)
//!                             ↓
//! source.rs (list + decode) → sync.rs (reconcile every interval) → registry
//! ```

pub mod error;
pub mod heartbeat;
pub mod redis_store;
pub mod source;
pub mod store;
pub mod sync;

pub use error::DiscoveryError;
pub use heartbeat::Heartbeat;
pub use redis_store::RedisStore;
pub use source::{DiscoveredServices, ServiceDiscoverySource, ServiceRecord};
pub use store::{KeyValueStore, MemoryStore};
pub use sync::{RegistrySync, SyncOutcome};
