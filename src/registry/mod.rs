//! Service instance registry.
//!
//! # Data Flow
//! ```text
//! Admin API / discovery sync → add_instance / remove_instance
//! Health checker             → update_health_with_ticket
//! Routing strategies         → healthy_instances (consistent snapshot)
//! ```
//!
//! # Design Decisions
//! - DashMap keyed by service name, one RwLock per service instance list
//! - Health flags are atomics ordered by registry-issued tickets
//! - In-flight counters live on the instance and leave with it

pub mod instance;
pub mod store;

pub use instance::{
    derive_instance_id, ConnectionGuard, HealthTicket, InstanceView, ServiceInstance,
};
pub use store::{InstanceRegistry, RegistryObserver, RegistryStatus, Service, ServiceView};
