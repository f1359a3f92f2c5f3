//! cortado — a cached key-value service.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            cortado                               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌─────────────┐   ┌─────────────────────────┐  │
//! │  │ HTTP front │──▶│ Coordinator │──▶│ Sharded cache           │  │
//! │  │ end        │   │             │   └─────────────────────────┘  │
//! │  └────────────┘   │             │──▶ write-behind queue ──▶ workers
//! │                   └─────────────┘        │                  │    │
//! │                         │                └── session pool ──┘    │
//! │                         └── read-through ────────┘ (MySQL)       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cortado::db::{mysql_opts, MySqlSession, SessionPool};
use cortado::error::Error;
use cortado::http::FrontEnd;
use cortado::writeback::{TaskQueue, WriteBehind};
use cortado::{CacheBuilder, Coordinator, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// cortado - cached key-value service with write-behind MySQL persistence
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8888")]
    listen_addr: String,

    /// Total cache capacity in entries (rounded up to a shard multiple)
    #[arg(long, env = "CACHE_TOTAL_CAPACITY", default_value = "1024")]
    cache_total_capacity: usize,

    /// Cache shard fanout (must be a power of two)
    #[arg(long, env = "NUM_SHARDS", default_value = "32")]
    num_shards: usize,

    /// Entries sampled when choosing an eviction victim
    #[arg(long, env = "SAMPLE_SIZE", default_value = "8")]
    sample_size: usize,

    /// Number of durable-store sessions in the pool
    #[arg(long, env = "SESSION_POOL_SIZE", default_value = "20")]
    session_pool_size: usize,

    /// Number of write-behind worker threads
    #[arg(long, env = "WRITE_BEHIND_WORKERS", default_value = "10")]
    write_behind_workers: usize,

    /// Number of HTTP handler threads
    #[arg(long, env = "HANDLER_THREADS", default_value = "8")]
    handler_threads: usize,

    /// MySQL host
    #[arg(long, env = "MYSQL_HOST", default_value = "localhost")]
    mysql_host: String,

    /// MySQL port
    #[arg(long, env = "MYSQL_PORT", default_value = "3306")]
    mysql_port: u16,

    /// MySQL user
    #[arg(long, env = "MYSQL_USER", default_value = "root")]
    mysql_user: String,

    /// MySQL password
    #[arg(long, env = "MYSQL_PASSWORD", default_value = "")]
    mysql_password: String,

    /// MySQL database name
    #[arg(long, env = "MYSQL_DATABASE", default_value = "KVStore")]
    mysql_database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);
    validate(&args)?;

    info!("Starting cortado");
    info!("  Listen address: {}", args.listen_addr);
    info!(
        "  Cache: {} entries over {} shards, sample size {}",
        args.cache_total_capacity, args.num_shards, args.sample_size
    );
    info!(
        "  Durable store: {}:{}/{} ({} sessions)",
        args.mysql_host, args.mysql_port, args.mysql_database, args.session_pool_size
    );
    info!("  Write-behind workers: {}", args.write_behind_workers);
    info!("  Handler threads: {}", args.handler_threads);

    // Sessions live from here to process teardown.
    let opts = mysql_opts(
        &args.mysql_host,
        args.mysql_port,
        &args.mysql_user,
        &args.mysql_password,
        &args.mysql_database,
    );
    let mut sessions = Vec::with_capacity(args.session_pool_size);
    for _ in 0..args.session_pool_size {
        sessions.push(MySqlSession::connect(opts.clone())?);
    }
    if let Some(first) = sessions.first_mut() {
        first.ensure_schema()?;
    }
    let pool = Arc::new(SessionPool::new(sessions));
    info!("Connected {} durable-store sessions", pool.size());

    let cache = CacheBuilder::new(args.cache_total_capacity)
        .num_shards(args.num_shards)
        .sample_size(args.sample_size)
        .build();

    let queue = Arc::new(TaskQueue::new());
    let workers = WriteBehind::spawn(
        Arc::clone(&queue),
        Arc::clone(&pool),
        args.write_behind_workers,
    );

    let coordinator = Arc::new(Coordinator::new(cache, pool, Arc::clone(&queue)));
    let front = FrontEnd::bind(&args.listen_addr, args.handler_threads, coordinator)?;

    info!("Serving. Press Enter to exit.");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    info!(pending = queue.len(), "Shutting down; draining write-behind queue");
    front.shutdown();
    workers.shutdown();
    info!("Shutdown complete");
    Ok(())
}

fn validate(args: &Args) -> Result<()> {
    if args.cache_total_capacity == 0 {
        return Err(Error::Config("cache_total_capacity must be > 0".into()));
    }
    if !args.num_shards.is_power_of_two() {
        return Err(Error::Config(format!(
            "num_shards must be a power of two, got {}",
            args.num_shards
        )));
    }
    if args.sample_size == 0 {
        return Err(Error::Config("sample_size must be > 0".into()));
    }
    if args.write_behind_workers == 0 || args.handler_threads == 0 {
        return Err(Error::Config(
            "write_behind_workers and handler_threads must be > 0".into(),
        ));
    }
    if args.session_pool_size <= args.write_behind_workers {
        // Workers can then hold every session and starve read-through misses.
        warn!(
            pool = args.session_pool_size,
            workers = args.write_behind_workers,
            "session pool is not larger than the worker count"
        );
    }
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
