//! # Eventide — event lifecycle scheduler daemon
//!
//! Usage:
//!   eventide run                       # Run the scheduler until Ctrl-C
//!   eventide pending --json            # Dump queued triggers
//!   eventide status <event_id>         # Stored vs computed lifecycle
//!   eventide --config ./eventide.toml run

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eventide_core::{EventId, EventideConfig};
use eventide_scheduler::{
    FanoutNotifier, SchedulerEngine, SqliteDirectory, SystemClock, TracingNotifier, status,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "eventide",
    version,
    about = "⏰ Eventide — time-triggered event lifecycle scheduler"
)]
struct Cli {
    /// Config file (default: ~/.eventide/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until interrupted
    Run,
    /// Load every event and print the pending triggers
    Pending {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the stored and computed lifecycle of one event
    Status {
        event_id: String,
        /// Number of recorded changes to show
        #[arg(long, default_value = "10")]
        history: usize,
    },
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn init_logging(cli: &Cli, config: &EventideConfig) {
    let level = if cli.verbose {
        "eventide=debug,eventide_scheduler=debug,eventide_core=debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn open_directory(config: &EventideConfig) -> Result<Arc<SqliteDirectory>> {
    let db_path = expand_path(&config.database.path);
    if let Some(parent) = Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = SqliteDirectory::open(Path::new(&db_path))
        .with_context(|| format!("opening event database at {db_path}"))?;
    tracing::info!("📂 Event database: {db_path}");
    Ok(Arc::new(db))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EventideConfig::load_from(Path::new(&expand_path(&path.to_string_lossy())))?,
        None => EventideConfig::load()?,
    };
    init_logging(&cli, &config);

    let db = open_directory(&config)?;

    match cli.command {
        Command::Run => run(config, db).await,
        Command::Pending { json } => pending(config, db, json).await,
        Command::Status { event_id, history } => show_status(db, &event_id, history).await,
    }
}

async fn run(config: EventideConfig, db: Arc<SqliteDirectory>) -> Result<()> {
    let notifier = FanoutNotifier::new()
        .with(Arc::new(TracingNotifier))
        .with(db.clone());
    let engine = Arc::new(SchedulerEngine::with_parts(
        db,
        Arc::new(notifier),
        Arc::new(SystemClock),
        config.scheduler,
    ));

    engine.start().await?;
    let status = engine.status().await;
    match &status.next_trigger {
        Some(next) => tracing::info!(
            pending = status.pending_trigger_count,
            "Next trigger: {} {} at {}",
            next.event_id,
            next.kind,
            next.time
        ),
        None => tracing::info!("No pending triggers"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("🛑 Shutdown requested");
    engine.stop().await;

    let stats = engine.stats();
    tracing::info!(
        executed = stats.executed,
        transitions = stats.transitions,
        discarded = stats.discarded,
        failed = stats.failed,
        "📊 Scheduler summary"
    );
    Ok(())
}

async fn pending(mut config: EventideConfig, db: Arc<SqliteDirectory>, json: bool) -> Result<()> {
    // Inspection only: never write statuses back.
    config.scheduler.reconcile_on_initialize = false;
    let engine = SchedulerEngine::new(db, config.scheduler);
    engine.initialize().await?;
    let pending = engine.list_pending().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }
    if pending.is_empty() {
        println!("No pending triggers.");
        return Ok(());
    }
    println!("⏰ {} pending trigger(s)\n", pending.len());
    for p in &pending {
        println!(
            "  #{:<5} {:<24} {:<20} {}  (in {}s)",
            p.trigger_id,
            p.event_id.as_str(),
            p.kind.as_str(),
            p.time.to_rfc3339(),
            p.time_until.as_secs()
        );
    }
    Ok(())
}

async fn show_status(db: Arc<SqliteDirectory>, event_id: &str, limit: usize) -> Result<()> {
    use eventide_scheduler::EventDirectory;

    let id = EventId::new(event_id);
    let Some(snapshot) = db.get(&id).await? else {
        anyhow::bail!("event '{event_id}' not found");
    };
    let computed = status::calculate(&snapshot.schedule, chrono::Utc::now());

    println!("📅 {}", snapshot.id);
    println!("   stored:   {}", snapshot.lifecycle);
    println!("   computed: {}", computed);
    if computed != snapshot.lifecycle {
        println!("   ⚠️  stale, will be corrected on the next trigger or restart");
    }

    let changes = db.history(&id, limit)?;
    if !changes.is_empty() {
        println!("\n   Recent changes:");
        for c in &changes {
            println!("   {}  {} → {}  ({})", c.at.to_rfc3339(), c.old, c.new, c.cause);
        }
    }
    Ok(())
}
