//! # Todoke — Campaign Delivery Scheduler
//!
//! Scans campaign submissions on an interval, decides which are due, and
//! delivers them over email (SMTP) or LINE push. A small HTTP gateway
//! exposes a manual trigger and read-only delivery status.
//!
//! Usage:
//!   todoke                               # Start scheduler + gateway
//!   todoke --config ./todoke.toml        # Custom config file
//!   todoke --check-once                  # One reconciliation run, then exit

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use todoke_channels::{EmailSender, LineSender};
use todoke_core::config::TodokeConfig;
use todoke_gateway::AppState;
use todoke_scheduler::{ReconcileEngine, spawn_scheduler};
use todoke_store::Store;

#[derive(Parser)]
#[command(
    name = "todoke",
    version,
    about = "📬 Todoke — campaign message delivery scheduler"
)]
struct Cli {
    /// Path to config file (default: ~/.todoke/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the gateway port
    #[arg(short, long)]
    port: Option<u16>,

    /// Run a single reconciliation pass and exit
    #[arg(long)]
    check_once: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "todoke=debug,tower_http=debug"
    } else {
        "todoke=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => TodokeConfig::load_from(path)?,
        None => TodokeConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    // Open the database
    let db_path = config.store.resolved_db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(Store::open(&db_path)?);

    // Wire channel senders into the reconciliation engine
    let mut engine = ReconcileEngine::new(
        store.clone(),
        config.scheduler.max_concurrent_sends,
        Duration::from_secs(config.scheduler.send_timeout_secs),
    );
    engine.register_sender(Arc::new(EmailSender::new(config.smtp.clone())));
    engine.register_sender(Arc::new(LineSender::new(config.line.clone())));
    let engine = Arc::new(engine);

    if cli.check_once {
        let summary = engine.run(chrono::Utc::now()).await?;
        println!(
            "✅ Checked {} campaign(s): {} delivered, {} failed, {} not due, {} skipped",
            summary.checked_campaigns,
            summary.processed_deliveries,
            summary.failed,
            summary.not_due,
            summary.skipped
        );
        return Ok(());
    }

    println!("📬 Todoke v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "   🌐 Gateway:   http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("   🗄️  Database:  {}", db_path.display());
    println!(
        "   ⏰ Scheduler: every {}s, up to {} concurrent sends",
        config.scheduler.check_interval_secs, config.scheduler.max_concurrent_sends
    );
    println!();

    // Background reconciliation loop
    let check_interval = config.scheduler.check_interval_secs;
    tokio::spawn(spawn_scheduler(engine.clone(), check_interval));

    // HTTP gateway (blocks until shutdown)
    let state = AppState {
        gateway_config: config.gateway.clone(),
        scheduler_config: config.scheduler.clone(),
        engine,
        store,
        start_time: std::time::Instant::now(),
    };
    todoke_gateway::start(state).await?;

    Ok(())
}
