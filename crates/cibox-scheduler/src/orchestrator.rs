//! Build orchestrator - runs a build's commands in order.

use chrono::Utc;
use cibox_core::executor::{CommandRunner, EnvPolicy, ExecOutcome, ShellJob};
use cibox_core::log::LogLayout;
use cibox_core::vcs::Vcs;
use cibox_core::{Build, Command, CommandResult, Error, ResourceId, Result, Status};
use cibox_db::BuildRepo;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::locks::LockRegistry;
use crate::sync::CommitSynchronizer;

/// Event emitted during a build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    ResultStarted {
        build_id: ResourceId,
        command: String,
    },
    ResultSkipped {
        build_id: ResourceId,
        command: String,
    },
    ResultFinished {
        build_id: ResourceId,
        command: String,
        status: Status,
    },
    BuildCompleted {
        build_id: ResourceId,
        status: Status,
    },
}

/// How commands are run.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Per-command limit. `None` waits forever.
    pub command_timeout: Option<Duration>,
    pub env: EnvPolicy,
}

/// Creates, syncs and runs builds.
pub struct BuildOrchestrator {
    repo: Arc<dyn BuildRepo>,
    sync: CommitSynchronizer,
    runner: Arc<dyn CommandRunner>,
    layout: LogLayout,
    settings: RunSettings,
    /// Held for the whole run of one build.
    build_locks: LockRegistry,
    /// Held while a project's working copy is in use.
    project_locks: LockRegistry,
    events: Option<mpsc::Sender<BuildEvent>>,
}

impl BuildOrchestrator {
    pub fn new(
        repo: Arc<dyn BuildRepo>,
        vcs: Arc<dyn Vcs>,
        runner: Arc<dyn CommandRunner>,
        layout: LogLayout,
    ) -> Self {
        Self {
            repo,
            sync: CommitSynchronizer::new(vcs),
            runner,
            layout,
            settings: RunSettings::default(),
            build_locks: LockRegistry::new(),
            project_locks: LockRegistry::new(),
            events: None,
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Send progress events to `tx`. A closed receiver is ignored.
    pub fn with_events(mut self, tx: mpsc::Sender<BuildEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Create and store a build with one pending result per project command.
    pub async fn create_build(
        &self,
        project_id: ResourceId,
        commit_hash: Option<String>,
    ) -> Result<Build> {
        let project = self.repo.get_project(project_id).await?;
        let commands = self.repo.list_commands(project_id).await?;

        let mut build = Build::new(&project, &commands, &self.layout);
        build.commit_hash = commit_hash;
        self.repo.insert_build(&build).await?;

        info!(build_id = %build.id, project = %project.name, results = build.results.len(), "Created build");
        Ok(build)
    }

    /// Store the tip of the project's tracked branch on the build.
    pub async fn fetch_commit(&self, build_id: ResourceId) -> Result<Build> {
        let build = self.repo.get_build(build_id).await?;
        let project = self.repo.get_project(build.project_id).await?;

        let commit = {
            let _checkout = self.project_locks.acquire(project.id).await;
            self.sync.fetch_latest_commit(&project).await?
        };
        self.repo.update_build_commit(build_id, &commit).await?;

        info!(build_id = %build_id, commit = %commit.hash, "Fetched commit");
        Ok(self.repo.get_build(build_id).await?)
    }

    /// Force every result of the build to `skipped`.
    pub async fn skip_build(&self, build_id: ResourceId) -> Result<Build> {
        let mut build = self.repo.get_build(build_id).await?;
        build.skip_all();
        for result in &build.results {
            self.repo.update_result(result).await?;
        }

        info!(build_id = %build_id, "Skipped build");
        Ok(build)
    }

    /// Sync the working copy to the build's commit and run every pending
    /// result in command order. Once the build has failed, remaining results
    /// are skipped instead of run.
    ///
    /// Returns the build as left by the run. A failed command is not an
    /// error; a failed sync is, and leaves the results untouched.
    ///
    /// Results still `busy` from an interrupted run are marked `failed`
    /// first. A build with nothing pending is returned without a sync.
    pub async fn run(&self, build_id: ResourceId) -> Result<Build> {
        let _running = self
            .build_locks
            .try_acquire(build_id)
            .ok_or_else(|| Error::Conflict(format!("build {} is already running", build_id)))?;

        let project_id = self.repo.get_build(build_id).await?.project_id;
        let project = self.repo.get_project(project_id).await?;

        let _checkout = self.project_locks.acquire(project.id).await;
        // Read after the wait: the build may have been skipped meanwhile.
        let mut build = self.repo.get_build(build_id).await?;
        let commands: HashMap<ResourceId, Command> = self
            .repo
            .list_commands(project.id)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        if let Some(orphan) = build
            .results
            .iter()
            .find(|r| !commands.contains_key(&r.command_id))
        {
            return Err(Error::NotFound(format!(
                "command {} for result {}",
                orphan.command_id, orphan.id
            )));
        }

        self.fail_interrupted(&mut build).await?;

        if !build.results.iter().any(CommandResult::is_pending) {
            let status = build.status();
            info!(build_id = %build_id, status = %status, "Nothing left to run");
            self.emit(BuildEvent::BuildCompleted { build_id, status })
                .await;
            return Ok(build);
        }

        let commit_hash = build
            .commit_hash
            .clone()
            .ok_or_else(|| Error::Sync(format!("build {} has no commit", build_id)))?;

        self.sync.sync_to_commit(&project, &commit_hash).await?;

        info!(build_id = %build_id, project = %project.name, commit = %commit_hash, "Running build");

        for idx in 0..build.results.len() {
            if !build.results[idx].is_pending() {
                warn!(
                    build_id = %build_id,
                    command = %build.results[idx].command_name,
                    status = %build.results[idx].status(),
                    "Result already handled, leaving as is"
                );
                continue;
            }

            let failed = build.status() == Status::Failed;
            let result = &mut build.results[idx];

            if failed {
                result.skip(Utc::now())?;
                self.repo.update_result(result).await?;
                info!(build_id = %build_id, command = %result.command_name, "Skipping command");
                self.emit(BuildEvent::ResultSkipped {
                    build_id,
                    command: result.command_name.clone(),
                })
                .await;
                continue;
            }

            let command = &commands[&result.command_id];

            result.start(Utc::now())?;
            self.repo.update_result(result).await?;
            self.emit(BuildEvent::ResultStarted {
                build_id,
                command: result.command_name.clone(),
            })
            .await;

            let job = ShellJob {
                script: command.command.clone(),
                working_dir: project.folder_path.clone(),
                log_path: result.log_path.clone(),
                timeout: self.settings.command_timeout,
            };

            let success = match self.runner.run(&job, &self.settings.env).await {
                Ok(ExecOutcome::Succeeded) => true,
                Ok(ExecOutcome::Failed { exit_code }) => {
                    info!(build_id = %build_id, command = %result.command_name, ?exit_code, "Command failed");
                    false
                }
                Ok(ExecOutcome::TimedOut) => {
                    warn!(build_id = %build_id, command = %result.command_name, "Command timed out");
                    false
                }
                Err(e) => {
                    error!(build_id = %build_id, command = %result.command_name, error = %e, "Command could not be run");
                    false
                }
            };

            result.finish(success, Utc::now())?;
            self.repo.update_result(result).await?;
            self.emit(BuildEvent::ResultFinished {
                build_id,
                command: result.command_name.clone(),
                status: result.status(),
            })
            .await;
        }

        let status = build.status();
        info!(build_id = %build_id, status = %status, "Build finished");
        self.emit(BuildEvent::BuildCompleted { build_id, status })
            .await;

        Ok(build)
    }

    /// Fail results left `busy` by a run that never recorded their end.
    async fn fail_interrupted(&self, build: &mut Build) -> Result<()> {
        let build_id = build.id;
        for result in build.results.iter_mut().filter(|r| r.is_busy()) {
            warn!(build_id = %build_id, command = %result.command_name, "Command was interrupted, marking failed");
            result.finish(false, Utc::now())?;
            self.repo.update_result(result).await?;
            self.emit(BuildEvent::ResultFinished {
                build_id,
                command: result.command_name.clone(),
                status: result.status(),
            })
            .await;
        }
        Ok(())
    }

    async fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
