// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use asc_daemon::build_app;
use asc_mapper::MapperRegistry;
use asc_provider::ProviderRegistry;
use asc_queue::{ShutdownToken, TaskQueue};
use asc_ratelimit::{MemoryCoordination, RateLimiter};
use asc_runtime::{EngineContext, spawn_delivery_workers, spawn_execution_workers};
use asc_store::MemoryStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "asc-daemon", version, about = "Answerscope pipeline daemon")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8090")]
    bind: String,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Execution worker count override.
    #[arg(long)]
    workers: Option<usize>,

    /// Delivery worker count.
    #[arg(long, default_value_t = 2)]
    delivery_workers: usize,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = asc_config::load_config(args.config.as_deref()).context("load config")?;
    let warnings = asc_config::validate_config(&config).context("validate config")?;

    let filter = if args.debug {
        EnvFilter::new("asc=debug,asc_daemon=debug,tower_http=debug")
    } else {
        EnvFilter::new(format!("asc={0},asc_daemon={0}", config.log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    for warning in &warnings {
        warn!(%warning, "configuration warning");
    }

    let worker_count = args.workers.unwrap_or(config.worker_count);
    let providers = Arc::new(ProviderRegistry::from_config(&config));
    let coordination = Arc::new(MemoryCoordination::new());

    let ctx = Arc::new(EngineContext {
        store: Arc::new(MemoryStore::new()),
        providers,
        limiter: Arc::new(RateLimiter::new(coordination)),
        mappers: Arc::new(MapperRegistry::with_builtins()),
        config,
        exec_queue: Arc::new(TaskQueue::new()),
        delivery_queue: Arc::new(TaskQueue::new()),
    });

    let shutdown = ShutdownToken::new();
    let mut workers = spawn_execution_workers(ctx.clone(), worker_count, shutdown.clone());
    workers.extend(spawn_delivery_workers(
        ctx.clone(),
        args.delivery_workers,
        shutdown.clone(),
    ));

    let app = build_app(ctx);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(
        bind = %args.bind,
        workers = worker_count,
        delivery_workers = args.delivery_workers,
        "asc-daemon listening"
    );

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            server_shutdown.trigger();
        })
        .await
        .context("serve")?;

    // Teardown order: the queue stops delivering (token), workers finish
    // their in-flight task and exit, then the coordination store and the
    // data store drop with the context.
    shutdown.trigger();
    for worker in workers {
        let _ = worker.await;
    }
    info!("asc-daemon stopped");
    Ok(())
}
