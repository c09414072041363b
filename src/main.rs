//! AI load balancer (gateway)
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                    LOAD BALANCER                     │
//!   Client Request       │  ┌──────────┐   ┌──────────────┐   ┌─────────────┐   │
//!   ─────────────────────┼─▶│  http    │──▶│   strategy   │──▶│  registry   │   │
//!                        │  │  proxy   │   │   selector   │   │ (healthy)   │   │
//!                        │  └────┬─────┘   └──────┬───────┘   └──────▲──────┘   │
//!                        │       │                │ rl-based         │          │
//!   Client Response      │       ▼                ▼                  │          │
//!   ◀────────────────────┼── downstream      RL decision API    discovery sync  │
//!                        │   instance        (+ feedback)       health checker  │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use ai_load_balancer::config::load_config;
use ai_load_balancer::discovery::{KeyValueStore, RedisStore};
use ai_load_balancer::lifecycle::{start_background_tasks, wait_for_signal, Shutdown};
use ai_load_balancer::observability::{init_logging, init_metrics};
use ai_load_balancer::{AppState, HttpServer};

const DEFAULT_CONFIG_PATH: &str = "config/load-balancer.toml";

#[derive(Parser)]
#[command(name = "ai-load-balancer", version)]
#[command(about = "Gateway with pluggable and RL-driven routing", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let path = cli.config.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    });
    let config = load_config(path.as_deref())?;

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?path,
        "ai-load-balancer starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        strategy = %config.routing.strategy,
        discovery = config.discovery.enabled,
        health_checks = config.health_check.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let discovery: Option<Arc<dyn KeyValueStore>> = if config.discovery.enabled {
        Some(Arc::new(RedisStore::new(
            &config.discovery.redis_url,
            config.discovery.timeout(),
        )?))
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let (state, workers) = AppState::new(config);
    let shutdown = Shutdown::new();
    let started = start_background_tasks(&state, workers, discovery, &shutdown);

    let server = HttpServer::new(state);
    server.run(listener, wait_for_signal()).await?;

    shutdown.trigger();
    started.tasks.join_all(Duration::from_secs(10)).await;
    drop(started.model_watcher);

    tracing::info!("Shutdown complete");
    Ok(())
}
