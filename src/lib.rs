//! AI load balancer library.
//!
//! A gateway that keeps a live registry of backend instances (fed by a
//! discovery store and active health probes), picks one per request with a
//! runtime-switchable strategy (round-robin, least-connections, a static
//! Q-table or an external RL service), forwards the request and reports the
//! outcome back to the RL service.

pub mod admin;
pub mod config;
pub mod discovery;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod registry;
pub mod rl;

pub use config::schema::BalancerConfig;
pub use http::{AppState, HttpServer, Workers};
pub use lifecycle::Shutdown;
