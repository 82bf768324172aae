//! In-process implementation of [`BuildRepo`].
//!
//! Used by tests and by one-off CLI runs that do not need a database.

use async_trait::async_trait;
use chrono::Utc;
use cibox_core::vcs::CommitInfo;
use cibox_core::{Build, Command, CommandResult, Project, ResourceId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BuildRepo, NewProject, unique_log_name};
use crate::{DbError, DbResult};

#[derive(Debug, Default)]
struct State {
    projects: HashMap<ResourceId, Project>,
    commands: HashMap<ResourceId, Vec<Command>>,
    builds: HashMap<ResourceId, Build>,
}

/// Build repository held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBuildRepo {
    state: Mutex<State>,
}

impl MemoryBuildRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BuildRepo for MemoryBuildRepo {
    async fn create_project(&self, project: NewProject) -> DbResult<Project> {
        let mut state = self.state();
        if state.projects.values().any(|p| p.name == project.name) {
            return Err(DbError::Duplicate(format!("project {}", project.name)));
        }

        let project = Project {
            id: ResourceId::new(),
            name: project.name,
            folder_path: project.folder_path,
            branch: project.branch,
            remote: project.remote,
            created_at: Utc::now(),
        };
        state.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: ResourceId) -> DbResult<Project> {
        self.state()
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("project {}", id)))
    }

    async fn find_project_by_name(&self, name: &str) -> DbResult<Option<Project>> {
        Ok(self
            .state()
            .projects
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn add_command(
        &self,
        project_id: ResourceId,
        name: &str,
        command: &str,
    ) -> DbResult<Command> {
        let mut state = self.state();
        if !state.projects.contains_key(&project_id) {
            return Err(DbError::NotFound(format!("project {}", project_id)));
        }

        let commands = state.commands.entry(project_id).or_default();
        unique_log_name(commands, name)?;
        let command = Command {
            id: ResourceId::new(),
            project_id,
            name: name.to_string(),
            command: command.to_string(),
            position: commands.len() as i32,
        };
        commands.push(command.clone());
        Ok(command)
    }

    async fn list_commands(&self, project_id: ResourceId) -> DbResult<Vec<Command>> {
        Ok(self
            .state()
            .commands
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_build(&self, build: &Build) -> DbResult<()> {
        let mut state = self.state();
        if !state.projects.contains_key(&build.project_id) {
            return Err(DbError::NotFound(format!("project {}", build.project_id)));
        }
        if state.builds.contains_key(&build.id) {
            return Err(DbError::Duplicate(format!("build {}", build.id)));
        }
        state.builds.insert(build.id, build.clone());
        Ok(())
    }

    async fn get_build(&self, id: ResourceId) -> DbResult<Build> {
        self.state()
            .builds
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))
    }

    async fn list_builds(&self, project_id: ResourceId, limit: i64) -> DbResult<Vec<Build>> {
        let mut builds: Vec<Build> = self
            .state()
            .builds
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect();
        builds.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        builds.truncate(limit.max(0) as usize);
        Ok(builds)
    }

    async fn update_build_commit(&self, id: ResourceId, commit: &CommitInfo) -> DbResult<()> {
        let mut state = self.state();
        let build = state
            .builds
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;
        build.set_commit(commit);
        Ok(())
    }

    async fn update_result(&self, result: &CommandResult) -> DbResult<()> {
        let mut state = self.state();
        let stored = state
            .builds
            .get_mut(&result.build_id)
            .and_then(|b| b.results.iter_mut().find(|r| r.id == result.id))
            .ok_or_else(|| DbError::NotFound(format!("result {}", result.id)))?;
        *stored = result.clone();
        Ok(())
    }

    async fn results_recent_first(&self, build_id: ResourceId) -> DbResult<Vec<CommandResult>> {
        let mut results = self.get_build(build_id).await?.results;
        // Stable sort keeps command order among equal or missing end times.
        results.sort_by(|a, b| match (a.end_time, b.end_time) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(results)
    }

    async fn results_oldest_first(&self, build_id: ResourceId) -> DbResult<Vec<CommandResult>> {
        let mut results = self.get_build(build_id).await?.results;
        results.sort_by(|a, b| match (a.start_time, b.start_time) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(results)
    }
}
