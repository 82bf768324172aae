//! Stored build commands.

use anyhow::{Context, Result};
use cibox_core::{Build, Status};
use cibox_db::BuildRepo;
use std::path::Path;
use std::sync::Arc;

use super::parse_build_id;
use super::run::{load_system, orchestrator};

fn time_or_dash(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub async fn list(repo: &dyn BuildRepo, project: &str, limit: i64, json: bool) -> Result<()> {
    let project = repo
        .find_project_by_name(project)
        .await?
        .with_context(|| format!("No project named '{}'", project))?;
    let builds = repo.list_builds(project.id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&builds)?);
        return Ok(());
    }

    if builds.is_empty() {
        println!("No builds for '{}'", project.name);
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:<7}  {:<19}", "ID", "COMMIT", "STATUS", "CREATED");
    for build in &builds {
        println!(
            "{:<36}  {:<10}  {:<7}  {:<19}",
            build.id,
            build.short_hash().unwrap_or("-"),
            build.status(),
            build.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn show(repo: &dyn BuildRepo, id: &str, json: bool) -> Result<()> {
    let build = repo.get_build(parse_build_id(id)?).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&build)?);
        return Ok(());
    }

    let project = repo.get_project(build.project_id).await?;
    print_build(&build, &project.name);

    let recent = repo.results_recent_first(build.id).await?;
    if let Some(last) = recent.iter().find(|r| r.end_time.is_some()) {
        println!(
            "\nLast finished: {} ({}) at {}",
            last.command_name,
            last.status(),
            time_or_dash(last.end_time)
        );
    }
    Ok(())
}

fn print_build(build: &Build, project: &str) {
    println!("Build:    {}", build.id);
    println!("Project:  {}", project);
    println!("Status:   {}", build.status());
    if let Some(hash) = &build.commit_hash {
        println!("Commit:   {}", hash);
    }
    if let Some(author) = &build.commit_author {
        println!("Author:   {}", author);
    }
    if let Some(message) = build.commit_message.as_deref().and_then(|m| m.lines().next()) {
        println!("Message:  {}", message);
    }
    println!("Started:  {}", time_or_dash(build.start_time()));
    println!("Finished: {}", time_or_dash(build.end_time()));

    println!("\nResults:");
    for result in &build.results {
        println!(
            "  {:<20} {:<7} {} -> {}",
            result.command_name,
            result.status(),
            time_or_dash(result.start_time),
            time_or_dash(result.end_time)
        );
    }
}

pub async fn skip(repo: Arc<dyn BuildRepo>, system_path: &Path, id: &str) -> Result<()> {
    let build_id = parse_build_id(id)?;
    let system = load_system(system_path)?;

    let build = orchestrator(repo, system).skip_build(build_id).await?;
    println!(
        "Skipped {} result(s) of build {}",
        build.results_in_status(Status::Skipped),
        build.id
    );
    Ok(())
}

/// Print logs in the order the commands ran.
pub async fn log(repo: &dyn BuildRepo, id: &str, command: Option<&str>) -> Result<()> {
    let build_id = parse_build_id(id)?;
    // Fails early on an unknown build.
    repo.get_build(build_id).await?;

    let results = repo.results_oldest_first(build_id).await?;
    let mut printed = 0;
    for result in results
        .iter()
        .filter(|r| command.is_none_or(|name| r.command_name == name))
    {
        println!("==> {} ({}) <==", result.command_name, result.status());
        match result.log() {
            Ok(log) => print!("{}", log),
            Err(e) => println!("{}", e),
        }
        println!();
        printed += 1;
    }

    if printed == 0 {
        if let Some(name) = command {
            anyhow::bail!("Build {} has no command named '{}'", build_id, name);
        }
    }
    Ok(())
}
