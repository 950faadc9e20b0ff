//! Flowsim CLI - webhook simulation lifecycle manager

use clap::{Parser, Subcommand};
use flowsim_core::config::Config;
use flowsim_core::domain::locking::{LockInfo, LockManager, LockStatus};
use flowsim_core::domain::simulation::{
    FlowId, LockOperation, LoggingHooks, ProjectId, SimulationRepository, SimulationResource,
    SimulationService,
};
use flowsim_core::storage::Database;
use flowsim_core::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "flowsim")]
#[command(author, version, about = "Per-flow webhook simulation manager", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output, warnings only in logs)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database path (overrides storage.database_path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Lock directory (overrides locking.lock_dir)
    #[arg(long, global = true)]
    lock_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OperationArg {
    Create,
    Delete,
}

impl From<OperationArg> for LockOperation {
    fn from(op: OperationArg) -> Self {
        match op {
            OperationArg::Create => LockOperation::Create,
            OperationArg::Delete => LockOperation::Delete,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the simulation for a flow, replacing any existing one
    Create {
        /// Flow ID
        #[arg(long)]
        flow: String,
        /// Project ID
        #[arg(long)]
        project: String,
    },

    /// Show the simulation for a flow and project
    Get {
        /// Flow ID
        #[arg(long)]
        flow: String,
        /// Project ID
        #[arg(long)]
        project: String,
    },

    /// Delete the simulation for a flow and project
    Delete {
        /// Flow ID
        #[arg(long)]
        flow: String,
        /// Project ID
        #[arg(long)]
        project: String,
    },

    /// List stored simulations, newest first
    List {
        /// Maximum number of simulations to show
        #[arg(short, long)]
        limit: Option<i32>,
    },

    /// Inspect and clean up transition locks
    Locks {
        #[command(subcommand)]
        action: LockAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum LockAction {
    /// Show the status of a flow's transition lock
    Status {
        /// Flow ID
        #[arg(long)]
        flow: String,
        /// Operation the lock guards
        #[arg(long, value_enum)]
        op: OperationArg,
    },
    /// List lock files in the lock directory
    List,
    /// Remove stale and corrupted lock files
    Cleanup,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "flowsim=debug"
    } else if cli.quiet {
        "flowsim=warn"
    } else {
        "flowsim=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Create {
            ref flow,
            ref project,
        } => {
            let service = open_service(&cli).await?;
            let simulation = service
                .create(&FlowId::from(flow.as_str()), &ProjectId::from(project.as_str()))
                .await?;
            print_simulation(&simulation, cli.format, cli.quiet, "Simulation created")
        }

        Commands::Get {
            ref flow,
            ref project,
        } => {
            let service = open_service(&cli).await?;
            let simulation = service
                .get(&FlowId::from(flow.as_str()), &ProjectId::from(project.as_str()))
                .await?;
            print_simulation(&simulation, cli.format, cli.quiet, "Simulation")
        }

        Commands::Delete {
            ref flow,
            ref project,
        } => {
            let service = open_service(&cli).await?;
            service
                .delete(&FlowId::from(flow.as_str()), &ProjectId::from(project.as_str()))
                .await?;
            if cli.format == OutputFormat::Json {
                println!(
                    "{}",
                    serde_json::json!({ "deleted": true, "flowId": flow, "projectId": project })
                );
            } else if !cli.quiet {
                println!("Simulation deleted for flow '{}' (project '{}')", flow, project);
            }
            Ok(())
        }

        Commands::List { limit } => cmd_list(&cli, limit).await,

        Commands::Locks { ref action } => cmd_locks(&cli, action).await,

        Commands::Config { ref action } => cmd_config(action, cli.format, cli.quiet),
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Load the config file and apply command-line overrides
fn load_config(cli: &Cli) -> Result<Config, Error> {
    let mut config = Config::load().map_err(|e| Error::ConfigError(format!("{:#}", e)))?;
    if let Some(db) = &cli.db {
        config.storage.database_path = db.clone();
    }
    if let Some(dir) = &cli.lock_dir {
        config.locking.lock_dir = dir.clone();
    }
    Ok(config)
}

async fn open_database(config: &Config) -> anyhow::Result<Database> {
    debug!(path = %config.storage.database_path.display(), "Opening database");
    Database::open(config.storage.to_database_config()).await
}

async fn open_service(cli: &Cli) -> anyhow::Result<SimulationService> {
    let config = load_config(cli)?;
    let db = open_database(&config).await?;

    let lock_config = config.locking.to_lock_config();
    let timeout = lock_config.default_timeout;
    let locks = LockManager::new(lock_config);
    locks.initialize().await.map_err(Error::from)?;

    Ok(SimulationService::new(
        Arc::new(SimulationRepository::new(db.pool().clone())),
        Arc::new(locks),
        Arc::new(LoggingHooks),
    )
    .with_lock_timeout(timeout))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_list(cli: &Cli, limit: Option<i32>) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let db = open_database(&config).await?;
    let repo = SimulationRepository::new(db.pool().clone());
    let simulations = repo.list(limit).await?;

    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&simulations)?);
        return Ok(());
    }

    if simulations.is_empty() {
        if !cli.quiet {
            println!("No simulations found.");
            println!("\nCreate one with: flowsim create --flow <id> --project <id>");
        }
        return Ok(());
    }

    println!("{:<36}  {:<24}  {:<24}  CREATED", "ID", "FLOW", "PROJECT");
    for sim in &simulations {
        println!(
            "{:<36}  {:<24}  {:<24}  {}",
            sim.id,
            sim.flow_id,
            sim.project_id,
            sim.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn cmd_locks(cli: &Cli, action: &LockAction) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let manager = LockManager::new(config.locking.to_lock_config());

    match action {
        LockAction::Status { flow, op } => {
            let key = LockOperation::from(*op).lock_key(&FlowId::from(flow.as_str()));
            let status = manager.check_lock_status(&key).await.map_err(Error::from)?;
            let info = manager.get_lock_info(&key).await.map_err(Error::from)?;

            if cli.format == OutputFormat::Json {
                println!(
                    "{}",
                    serde_json::json!({ "lockKey": key, "status": status, "holder": info })
                );
            } else {
                println!("{}: {}", key, status);
                if status != LockStatus::Available {
                    if let Some(info) = info {
                        print_lock_details(&info);
                    }
                }
            }
        }
        LockAction::List => {
            let locks = manager.list_lock_files().await.map_err(Error::from)?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&locks)?);
            } else if locks.is_empty() {
                if !cli.quiet {
                    println!("No lock files in {}", manager.config().lock_dir.display());
                }
            } else {
                for info in &locks {
                    let state = if info.is_stale() { "stale" } else { "held" };
                    println!("{} [{}]", info.lock_key, state);
                    print_lock_details(info);
                }
            }
        }
        LockAction::Cleanup => {
            let cleaned = manager.cleanup_stale_locks().await.map_err(Error::from)?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "cleaned": cleaned }));
            } else if !cli.quiet {
                println!("Removed {} stale lock file(s)", cleaned);
            }
        }
    }
    Ok(())
}

fn cmd_config(action: &ConfigAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config_err = |e: anyhow::Error| Error::ConfigError(format!("{:#}", e));

    match action {
        ConfigAction::Get { key } => {
            let config = Config::load().map_err(config_err)?;
            let value = config.get(key).map_err(config_err)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load().map_err(config_err)?;
            config.set(key, value).map_err(config_err)?;
            config.save().map_err(config_err)?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load().map_err(config_err)?;
            let items = config.list().map_err(config_err)?;
            if format == OutputFormat::Json {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                println!("{}", serde_json::Value::Object(map));
            } else {
                for (key, value) in items {
                    println!("{} = {}", key, value);
                }
            }
        }
        ConfigAction::Reset => {
            Config::reset().map_err(config_err)?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path().map_err(config_err)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_simulation(
    simulation: &SimulationResource,
    format: OutputFormat,
    quiet: bool,
    title: &str,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(simulation)?),
        OutputFormat::Text if quiet => println!("{}", simulation.id),
        OutputFormat::Text => {
            println!("{}:", title);
            println!("  ID: {}", simulation.id);
            println!("  Flow: {}", simulation.flow_id);
            println!("  Project: {}", simulation.project_id);
            println!("  Created: {}", simulation.created_at.to_rfc3339());
            println!("  Updated: {}", simulation.updated_at.to_rfc3339());
        }
    }
    Ok(())
}

fn print_lock_details(info: &LockInfo) {
    println!("  Holder: {}", info.holder_label());
    println!("  Acquired: {}", info.acquired_at.to_rfc3339());
    if let Some(expires) = info.expires_at {
        println!("  Expires: {}", expires.to_rfc3339());
    }
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(e) => {
            eprintln!("error [{}]: {}", e.code(), e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("  try: {}", suggestion);
            }
        }
        None => eprintln!("error: {:#}", err),
    }
}
