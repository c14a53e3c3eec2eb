use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stackrun_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
use tracing_subscriber::EnvFilter;

mod commands;

/// Environment variable holding the log filter, e.g. `stackrun_core=debug`
const LOG_ENV: &str = "STACKRUN_LOG";

/// Stackrun - Run stack commands across a workspace in dependency order
#[derive(Parser)]
#[command(name = "stackrun")]
#[command(about = "Run infrastructure stack commands across a workspace in dependency order")]
#[command(version)]
struct Cli {
    /// Path to the workspace root (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Log filter used when STACKRUN_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List services in the workspace
    List,
    /// Show the service dependency graph
    Graph,
    /// List the available stack commands
    Commands,
    /// Show the execution order of a command without running it
    Plan {
        /// Command name, e.g. "deploy"
        command: String,
        /// Services to target (defaults to every applicable service)
        targets: Vec<String>,
    },
    /// Run a command on services and their dependencies
    Run {
        /// Command name, e.g. "deploy"
        command: String,
        /// Services to target (defaults to every applicable service)
        targets: Vec<String>,
        /// Print the per-service outcomes as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(v) if !v.trim().is_empty() => EnvFilter::try_new(v)?,
        _ => EnvFilter::try_new(level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    tracing::debug!(workspace = %cli.workspace.display(), "loading workspace");

    // Initialize workspace manager with all business logic
    let manager = WorkspaceManager::new(WorkspaceManagerConfig {
        workspace_root: cli.workspace,
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to initialize workspace: {}", e))?;

    // Execute command (CLI layer only handles presentation)
    match cli.command {
        Commands::List => commands::list::execute(&manager).await,
        Commands::Graph => commands::graph::execute(&manager).await,
        Commands::Commands => commands::catalog::execute(&manager),
        Commands::Plan { command, targets } => {
            commands::plan::execute(&manager, &command, &targets).await
        }
        Commands::Run {
            command,
            targets,
            json,
        } => commands::run::execute(&manager, &command, &targets, json).await,
    }
}
