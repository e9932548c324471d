//! msghub - multi-tenant publish/subscribe message hub
//!
//! Usage:
//!   msghub [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>              Configuration file path
//!   -b, --bind <ADDR>                HTTP bind address (default: 0.0.0.0:8080)
//!   --ws-bind <ADDR>                 Extra WebSocket-only bind address
//!   --replay-capacity <N>            Messages kept per topic (default: 1000)
//!   --max-inflight-deliveries <N>    Concurrent deliveries, 0 = unbounded
//!   -l, --log-level                  Log level (error, warn, info, debug, trace)
//!   -h, --help                       Print help

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use msghub::config::Config;
use msghub::server::Server;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// msghub - publish/subscribe over WebSocket and HTTP
#[derive(Parser, Debug)]
#[command(name = "msghub")]
#[command(version)]
#[command(about = "Multi-tenant publish/subscribe message hub")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Extra WebSocket-only bind address
    #[arg(long)]
    ws_bind: Option<SocketAddr>,

    /// Messages retained per topic for HTTP draining
    #[arg(long)]
    replay_capacity: Option<usize>,

    /// Concurrent deliveries across all hubs (0 = unbounded)
    #[arg(long)]
    max_inflight_deliveries: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration file if specified, otherwise defaults plus MSGHUB__* overrides
    let loaded = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging - CLI overrides config
    let log_level = args.log_level.unwrap_or_else(|| {
        match config.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    // CLI args override file config
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(ws_bind) = args.ws_bind {
        config.server.ws_bind = Some(ws_bind);
    }
    if let Some(capacity) = args.replay_capacity {
        config.hub.replay_capacity = capacity;
    }
    if let Some(max_inflight) = args.max_inflight_deliveries {
        config.hub.max_inflight_deliveries = max_inflight;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("Starting msghub");
    info!("  HTTP address: {}", config.server.bind);
    match &config.server.ws_bind {
        Some(ws_addr) => info!("  WebSocket address: {} (and /ws on HTTP)", ws_addr),
        None => info!("  WebSocket: /ws on HTTP address"),
    }
    info!("  Replay capacity: {}", config.hub.replay_capacity);
    if config.hub.max_inflight_deliveries == 0 {
        info!("  Max in-flight deliveries: unbounded");
    } else {
        info!(
            "  Max in-flight deliveries: {}",
            config.hub.max_inflight_deliveries
        );
    }
    info!("  Users: {}", config.auth.users.len());
    info!(
        "  Metrics: {}",
        if config.metrics.enabled {
            "enabled (/metrics)"
        } else {
            "disabled"
        }
    );

    let server = Server::new(config)?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                let _ = shutdown.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
