//! Local build execution command.

use anyhow::{Context, Result};
use cibox_config::{SystemConfig, load_project, load_system_config};
use cibox_core::Status;
use cibox_core::log::LogLayout;
use cibox_db::BuildRepo;
use cibox_executor::{GitCli, ShellRunner};
use cibox_scheduler::{BuildEvent, BuildOrchestrator, RunSettings};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{ensure_project, open_repo};

/// Wire the orchestrator to git, the shell and the configured log directory.
pub fn orchestrator(repo: Arc<dyn BuildRepo>, system: SystemConfig) -> BuildOrchestrator {
    BuildOrchestrator::new(
        repo,
        Arc::new(GitCli::new()),
        Arc::new(ShellRunner::new()),
        LogLayout::new(system.log_dir),
    )
    .with_settings(RunSettings {
        command_timeout: system.command_timeout,
        env: system.env,
    })
}

pub fn load_system(path: &Path) -> Result<SystemConfig> {
    load_system_config(path)
        .with_context(|| format!("Failed to load system config: {}", path.display()))
}

/// A commit given on the command line must be a (possibly abbreviated)
/// hex object name.
fn check_commit(commit: &str) -> Result<()> {
    let hex = commit.chars().all(|c| c.is_ascii_hexdigit());
    if !hex || !(4..=40).contains(&commit.len()) {
        anyhow::bail!("Invalid commit '{}': expected 4 to 40 hex digits", commit);
    }
    Ok(())
}

/// Create a build for the project and run it.
pub async fn run(
    config_path: &Path,
    system_path: &Path,
    database_url: Option<&str>,
    commit: Option<String>,
) -> Result<()> {
    if let Some(commit) = &commit {
        check_commit(commit)?;
    }

    let config = load_project(config_path)
        .with_context(|| format!("Failed to load project file: {}", config_path.display()))?;
    let system = load_system(system_path)?;

    let repo = open_repo(database_url).await?;
    let project = ensure_project(repo.as_ref(), &config).await?;

    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = orchestrator(repo, system).with_events(tx);

    let build = orchestrator.create_build(project.id, commit).await?;
    let build = if build.commit_hash.is_some() {
        build
    } else {
        orchestrator.fetch_commit(build.id).await?
    };

    println!("Running build {} of '{}'", build.id, project.name);
    if let Some(hash) = build.short_hash() {
        match build.commit_message.as_deref().and_then(|m| m.lines().next()) {
            Some(subject) => println!("Commit: {} {}", hash, subject),
            None => println!("Commit: {}", hash),
        }
    }
    println!("\n--- Starting build ---\n");

    // The task owns the only sender, so the event loop ends with the run.
    let build_id = build.id;
    let handle = tokio::spawn(async move { orchestrator.run(build_id).await });

    while let Some(event) = rx.recv().await {
        match event {
            BuildEvent::ResultStarted { command, .. } => {
                println!("▶ '{}' started", command);
            }
            BuildEvent::ResultSkipped { command, .. } => {
                println!("⊘ '{}' skipped\n", command);
            }
            BuildEvent::ResultFinished {
                command, status, ..
            } => {
                if status == Status::Passed {
                    println!("✓ '{}' passed\n", command);
                } else {
                    println!("✗ '{}' {}\n", command, status);
                }
            }
            BuildEvent::BuildCompleted { status, .. } => {
                println!("--- Build {} ---", status);
            }
        }
    }

    let build = handle.await.context("Build task failed")??;

    println!("\n--- Command Summary ---");
    for result in &build.results {
        println!("  {} - {}", result.command_name, result.status());
        println!("      log: {}", result.log_path.display());
    }

    match build.status() {
        Status::Passed => {
            println!("\n✓ Build passed!");
            Ok(())
        }
        status => anyhow::bail!("Build {}", status),
    }
}
