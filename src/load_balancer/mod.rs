//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! /proxy/{service} request
//!     → selector.rs (active strategy, healthy snapshot from the registry)
//!     → Apply routing strategy:
//!         - round_robin.rs (per-service cursor)
//!         - least_conn.rs (fewest in-flight requests)
//!         - rl_static.rs (Q-table lookup on the encoded state)
//!         - rl_remote.rs (external decision API, deterministic fallback)
//!     → Selection (instance + in-flight guard)
//! ```
//!
//! # Design Decisions
//! - Strategies only ever see healthy instances
//! - "No instance" is `None`, never an error
//! - Every selection holds a connection guard, whatever the strategy, so
//!   in-flight counts stay exact across strategy switches

pub mod least_conn;
pub mod rl_remote;
pub mod rl_static;
pub mod round_robin;
pub mod selector;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::registry::{ConnectionGuard, ServiceInstance};

pub use least_conn::LeastConnections;
pub use rl_remote::RlRemote;
pub use rl_static::RlStatic;
pub use round_robin::RoundRobin;
pub use selector::StrategySelector;

/// Names of the interchangeable routing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrategyKind {
    RoundRobin,
    LeastConnections,
    /// Decisions delegated to the external RL service.
    RlRemote,
    /// Decisions from the locally loaded Q-table.
    RlStatic,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::RoundRobin,
        StrategyKind::LeastConnections,
        StrategyKind::RlRemote,
        StrategyKind::RlStatic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round-robin",
            StrategyKind::LeastConnections => "least-connections",
            StrategyKind::RlRemote => "rl-based",
            StrategyKind::RlStatic => "rl-static",
        }
    }

    pub fn is_rl(self) -> bool {
        matches!(self, StrategyKind::RlRemote | StrategyKind::RlStatic)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for StrategyKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown routing strategy '{0}'")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" => Ok(StrategyKind::RoundRobin),
            // "connection-aware" is the older name of the same algorithm.
            "least-connections" | "connection-aware" => Ok(StrategyKind::LeastConnections),
            "rl-based" => Ok(StrategyKind::RlRemote),
            "rl-static" => Ok(StrategyKind::RlStatic),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Per-request routing input.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    pub service_name: String,
    pub path: String,
    pub method: String,
}

impl RoutingContext {
    pub fn new(
        service_name: impl Into<String>,
        path: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            path: path.into(),
            method: method.into(),
        }
    }
}

/// How a selection was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// Deterministic algorithm (round-robin, least-connections).
    Algorithm,
    /// RL model or RL service.
    Model,
    /// RL strategy fell back to a deterministic algorithm.
    Fallback(&'static str),
}

/// A chosen instance, counted as in flight until dropped.
#[derive(Debug)]
pub struct Selection {
    guard: ConnectionGuard,
    pub strategy: StrategyKind,
    pub source: DecisionSource,
}

impl Selection {
    pub fn new(
        instance: &Arc<ServiceInstance>,
        strategy: StrategyKind,
        source: DecisionSource,
    ) -> Self {
        Self {
            guard: instance.acquire(),
            strategy,
            source,
        }
    }

    pub fn instance(&self) -> &Arc<ServiceInstance> {
        self.guard.instance()
    }

    /// Re-attribute a selection made by a fallback strategy.
    pub(crate) fn attributed_to(mut self, strategy: StrategyKind, source: DecisionSource) -> Self {
        self.strategy = strategy;
        self.source = source;
        self
    }
}

/// An interchangeable instance-selection algorithm.
#[async_trait]
pub trait RoutingStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Pick one of `healthy`, or `None` when it is empty.
    ///
    /// `healthy` is a registry snapshot in registration order.
    async fn select(
        &self,
        ctx: &RoutingContext,
        healthy: &[Arc<ServiceInstance>],
    ) -> Option<Selection>;

    /// Strategy-local counters for introspection.
    fn stats(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    fn reset_stats(&self) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_round_trip() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.as_str().parse::<StrategyKind>().unwrap(), kind);
        }
        assert_eq!(
            " Least-Connections ".parse::<StrategyKind>().unwrap(),
            StrategyKind::LeastConnections
        );
        assert_eq!(
            "connection-aware".parse::<StrategyKind>().unwrap(),
            StrategyKind::LeastConnections
        );
        assert!("weighted".parse::<StrategyKind>().is_err());
    }
}
