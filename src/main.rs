//! strata-maintd - Maintenance daemon for the Strata memory substrate
//!
//! Opens the SQLite metadata store, wires the decay engine, relationship
//! graph and maintenance scheduler, then either runs the scheduler until
//! Ctrl-C or runs a single job and prints its result as JSON.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use strata_core::{
    error::{Result, StrataError},
    DecayEngine, JobOptions, MaintenanceScheduler, MetadataStore, RelationshipGraph, SqliteStore,
    StrataConfig,
};
use tracing::{debug, info, Level};
use tracing_subscriber::{self, EnvFilter};

/// Get the default database path using XDG_DATA_HOME standard
fn get_default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("strata")
        .join("strata.db")
}

#[derive(Parser)]
#[command(name = "strata-maintd")]
#[command(about = "Background maintenance for the Strata memory substrate", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(short, long, env = "STRATA_DB_PATH")]
    database: Option<PathBuf>,

    /// Run one job (decay, consolidate, summarize, reindex, cleanup) and exit
    #[arg(long)]
    run_once: Option<String>,

    /// Report without deleting (cleanup only)
    #[arg(long)]
    dry_run: bool,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_str().to_lowercase();
        EnvFilter::new(format!("strata_core={},strata_maintd={}", level, level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("strata-maintd v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => StrataConfig::from_file(path)?,
        None => StrataConfig::default(),
    };

    let db_path = cli.database.clone().unwrap_or_else(get_default_db_path);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    info!("Using database: {}", db_path.display());

    let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::open(&db_path).await?);
    let decay = Arc::new(DecayEngine::new(config.decay.clone()));
    let graph = Arc::new(RelationshipGraph::new(store.clone(), config.graph.clone()));
    let scheduler = Arc::new(MaintenanceScheduler::new(
        store,
        decay,
        graph,
        config.maintenance.clone(),
    ));

    if let Some(job) = cli.run_once {
        let result = scheduler
            .run_job_named(&job, JobOptions { dry_run: cli.dry_run })
            .await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        if !result.success {
            return Err(StrataError::Other(format!(
                "{} job finished with {} error(s)",
                result.job,
                result.errors.len()
            )));
        }
        return Ok(());
    }

    scheduler.start().await;
    info!("Maintenance scheduler running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, waiting for in-flight job...");
    scheduler.stop().await;

    Ok(())
}
