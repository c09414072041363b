//! Background task orchestration.
//!
//! # Tasks
//! - `discovery-sync`: registry reconciliation against the discovery store
//! - `health-checker`: active probes of every instance
//! - `rl-health`: readiness of the external RL service
//! - `rl-feedback`: delivery of queued outcomes
//! - `rl-experience`: delivery of training experiences, when the collector is enabled
//!
//! The model watcher runs on notify's own thread and is returned to the
//! caller, which keeps it alive.

use notify::RecommendedWatcher;
use std::sync::Arc;

use crate::discovery::{KeyValueStore, RegistrySync, ServiceDiscoverySource};
use crate::http::server::{AppState, Workers};
use crate::lifecycle::shutdown::{BackgroundTasks, Shutdown};
use crate::rl::ModelWatcher;

/// Handles that must outlive the server.
pub struct Started {
    pub tasks: BackgroundTasks,
    pub model_watcher: Option<RecommendedWatcher>,
}

/// Spawn every periodic task for `state`.
///
/// `discovery` is `None` when discovery is disabled.
pub fn start_background_tasks(
    state: &AppState,
    workers: Workers,
    discovery: Option<Arc<dyn KeyValueStore>>,
    shutdown: &Shutdown,
) -> Started {
    let config = &state.config;
    let mut tasks = BackgroundTasks::new();

    if let Some(store) = discovery {
        let sync = RegistrySync::new(
            state.registry.clone(),
            ServiceDiscoverySource::new(store, config.discovery.key_prefix.clone()),
            config.discovery.sync_interval(),
            config.discovery.timeout(),
        );
        tasks.spawn("discovery-sync", sync.run(shutdown.subscribe()));
    }

    if config.health_check.enabled {
        tasks.spawn("health-checker", state.health.clone().run(shutdown.subscribe()));
    }

    let rl_remote = state.selector.rl_remote().clone();
    tasks.spawn(
        "rl-health",
        rl_remote.run_health_monitor(config.rl_remote.health_interval(), shutdown.subscribe()),
    );

    tasks.spawn("rl-feedback", workers.feedback.run(shutdown.subscribe()));
    if let Some(experience) = workers.experience {
        tasks.spawn("rl-experience", experience.run(shutdown.subscribe()));
    }

    let model_watcher = if config.rl_static.watch {
        match ModelWatcher::new(state.models.clone()).run() {
            Ok(watcher) => watcher,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start model watcher");
                None
            }
        }
    } else {
        None
    };

    tracing::info!(tasks = tasks.len(), "Background tasks started");
    Started {
        tasks,
        model_watcher,
    }
}
