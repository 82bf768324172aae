//! Repository trait and implementations.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use cibox_core::log::command_log_name;
use cibox_core::vcs::CommitInfo;
use cibox_core::{Build, Command, CommandResult, Project, ResourceId};
use std::path::PathBuf;

use crate::{DbError, DbResult};

pub use memory::MemoryBuildRepo;
pub use postgres::PgBuildRepo;

/// Fields needed to register a project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub folder_path: PathBuf,
    pub branch: String,
    pub remote: String,
}

/// Check that a new command gets a log file name of its own.
fn unique_log_name(existing: &[Command], name: &str) -> DbResult<()> {
    let log_name = command_log_name(name)
        .ok_or_else(|| DbError::Invalid(format!("command name '{}' has no letters or digits", name)))?;
    match existing
        .iter()
        .find(|c| command_log_name(&c.name).as_deref() == Some(log_name.as_str()))
    {
        Some(other) => Err(DbError::Duplicate(format!(
            "command '{}' shares log name '{}' with '{}'",
            name, log_name, other.name
        ))),
        None => Ok(()),
    }
}

/// Storage for projects, commands, builds and their results.
#[async_trait]
pub trait BuildRepo: Send + Sync {
    async fn create_project(&self, project: NewProject) -> DbResult<Project>;
    async fn get_project(&self, id: ResourceId) -> DbResult<Project>;
    async fn find_project_by_name(&self, name: &str) -> DbResult<Option<Project>>;

    /// Append a command after the project's existing ones.
    ///
    /// Fails with [`DbError::Duplicate`] when the name maps to the same log
    /// file name as an existing command, and with [`DbError::Invalid`] when
    /// it maps to none.
    async fn add_command(&self, project_id: ResourceId, name: &str, command: &str)
    -> DbResult<Command>;
    /// Commands in execution order.
    async fn list_commands(&self, project_id: ResourceId) -> DbResult<Vec<Command>>;

    /// Store a new build together with its results.
    async fn insert_build(&self, build: &Build) -> DbResult<()>;
    /// A build with its results in command order.
    async fn get_build(&self, id: ResourceId) -> DbResult<Build>;
    /// Most recently created first.
    async fn list_builds(&self, project_id: ResourceId, limit: i64) -> DbResult<Vec<Build>>;
    async fn update_build_commit(&self, id: ResourceId, commit: &CommitInfo) -> DbResult<()>;

    /// Persist status and timestamps of an existing result.
    async fn update_result(&self, result: &CommandResult) -> DbResult<()>;
    /// By end time, latest first. Unfinished results come last.
    async fn results_recent_first(&self, build_id: ResourceId) -> DbResult<Vec<CommandResult>>;
    /// By start time, earliest first. Unstarted results come last.
    async fn results_oldest_first(&self, build_id: ResourceId) -> DbResult<Vec<CommandResult>>;
}
