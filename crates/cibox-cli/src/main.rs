//! cibox CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "cibox")]
#[command(about = "Minimal CI build runner", long_about = None)]
struct Cli {
    /// System configuration file
    #[arg(
        long,
        global = true,
        env = "CIBOX_SYSTEM_CONFIG",
        default_value = "cibox-system.kdl"
    )]
    system_config: PathBuf,

    /// PostgreSQL connection string. Builds are kept in memory when unset.
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a project configuration
    Validate {
        /// Path to the project file
        #[arg(default_value = "cibox.kdl")]
        path: PathBuf,
    },
    /// Show the latest commit on the project's tracked branch
    LatestCommit {
        /// Path to the project file
        #[arg(default_value = "cibox.kdl")]
        path: PathBuf,
    },
    /// Build a project
    Run {
        /// Path to the project file
        #[arg(default_value = "cibox.kdl")]
        path: PathBuf,
        /// Commit to build. Defaults to the tip of the tracked branch.
        #[arg(long)]
        commit: Option<String>,
    },
    /// Inspect stored builds
    Builds {
        #[command(subcommand)]
        command: BuildCommands,
    },
}

#[derive(Subcommand)]
enum BuildCommands {
    /// List recent builds of a project
    List {
        /// Project name
        project: String,
        /// Maximum number of builds to show
        #[arg(long, default_value = "10")]
        limit: i64,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show build details
    Show {
        /// Build ID
        id: String,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark every result of a build as skipped
    Skip {
        /// Build ID
        id: String,
    },
    /// Print command logs of a build
    Log {
        /// Build ID
        id: String,
        /// Only this command
        #[arg(long)]
        command: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = cli.database_url.as_deref();

    match cli.command {
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::LatestCommit { path } => {
            commands::latest_commit(&path).await?;
        }
        Commands::Run { path, commit } => {
            commands::run::run(&path, &cli.system_config, database_url, commit).await?;
        }
        Commands::Builds { command } => {
            let repo = commands::connect(database_url).await?;
            match command {
                BuildCommands::List {
                    project,
                    limit,
                    json,
                } => {
                    commands::builds::list(repo.as_ref(), &project, limit, json).await?;
                }
                BuildCommands::Show { id, json } => {
                    commands::builds::show(repo.as_ref(), &id, json).await?;
                }
                BuildCommands::Skip { id } => {
                    commands::builds::skip(repo, &cli.system_config, &id).await?;
                }
                BuildCommands::Log { id, command } => {
                    commands::builds::log(repo.as_ref(), &id, command.as_deref()).await?;
                }
            }
        }
    }

    Ok(())
}
