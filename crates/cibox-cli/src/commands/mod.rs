//! CLI command implementations.

pub mod builds;
pub mod run;

use anyhow::{Context, Result};
use chrono::Utc;
use cibox_config::{ProjectConfig, load_project};
use cibox_core::{Project, ResourceId};
use cibox_db::{BuildRepo, MemoryBuildRepo, NewProject, PgBuildRepo, create_pool, run_migrations};
use cibox_executor::GitCli;
use cibox_scheduler::CommitSynchronizer;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub fn validate(path: &Path) -> Result<()> {
    match load_project(path) {
        Ok(project) => {
            println!(
                "Configuration is valid: project '{}' with {} command(s)",
                project.name,
                project.commands.len()
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

pub async fn latest_commit(path: &Path) -> Result<()> {
    let config = load_project(path)
        .with_context(|| format!("Failed to load project file: {}", path.display()))?;
    let project = Project {
        id: ResourceId::new(),
        name: config.name,
        folder_path: config.folder,
        branch: config.branch,
        remote: config.remote,
        created_at: Utc::now(),
    };

    let sync = CommitSynchronizer::new(Arc::new(GitCli::new()));
    let commit = sync.fetch_latest_commit(&project).await?;

    println!("commit {}", commit.hash);
    println!("Author: {}", commit.author);
    println!("Date:   {}", commit.date.to_rfc3339());
    println!();
    for line in commit.message.lines() {
        println!("    {}", line);
    }
    Ok(())
}

/// Connect to PostgreSQL and apply pending migrations.
pub async fn connect(database_url: Option<&str>) -> Result<Arc<dyn BuildRepo>> {
    let url = database_url.context("DATABASE_URL is required to inspect stored builds")?;
    info!("Connecting to database...");
    let pool = create_pool(url).await?;
    run_migrations(&pool).await?;
    info!("Database connected");
    Ok(Arc::new(PgBuildRepo::new(pool)))
}

/// PostgreSQL when a URL is given, otherwise a throwaway in-memory store.
pub async fn open_repo(database_url: Option<&str>) -> Result<Arc<dyn BuildRepo>> {
    match database_url {
        Some(_) => connect(database_url).await,
        None => {
            info!("No DATABASE_URL set, keeping builds in memory");
            Ok(Arc::new(MemoryBuildRepo::new()))
        }
    }
}

/// Find the stored project by name, registering it with its commands on
/// first use. Commands of an existing project are not changed.
pub async fn ensure_project(repo: &dyn BuildRepo, config: &ProjectConfig) -> Result<Project> {
    if let Some(project) = repo.find_project_by_name(&config.name).await? {
        let stored: Vec<String> = repo
            .list_commands(project.id)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let configured: Vec<&str> = config.commands.iter().map(|c| c.name.as_str()).collect();
        if stored != configured {
            warn!(
                project = %project.name,
                ?stored,
                ?configured,
                "Configured commands differ from stored ones, using stored commands"
            );
        }
        return Ok(project);
    }

    let project = repo
        .create_project(NewProject {
            name: config.name.clone(),
            folder_path: config.folder.clone(),
            branch: config.branch.clone(),
            remote: config.remote.clone(),
        })
        .await?;
    for command in &config.commands {
        repo.add_command(project.id, &command.name, &command.run)
            .await?;
    }

    info!(project = %project.name, commands = config.commands.len(), "Registered project");
    Ok(project)
}

pub fn parse_build_id(id: &str) -> Result<ResourceId> {
    id.parse()
        .with_context(|| format!("Invalid build id: {}", id))
}
