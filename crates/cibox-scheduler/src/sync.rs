//! Commit synchronization for project working copies.

use cibox_core::vcs::{CommitInfo, Vcs};
use cibox_core::{Error, Project, Result};
use std::sync::Arc;
use tracing::{error, info};

/// Moves a project's working copy between commits.
pub struct CommitSynchronizer {
    vcs: Arc<dyn Vcs>,
}

impl CommitSynchronizer {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        Self { vcs }
    }

    /// Discard local changes, update the project branch, then check out
    /// `commit_hash`. Stops at the first failing step.
    pub async fn sync_to_commit(&self, project: &Project, commit_hash: &str) -> Result<()> {
        let dir = project.folder_path.as_path();
        info!(project = %project.name, commit = %commit_hash, "Syncing working copy");

        self.vcs
            .reset_hard(dir)
            .await
            .map_err(|e| sync_error("reset", e))?;
        self.vcs
            .checkout(dir, &project.branch)
            .await
            .map_err(|e| sync_error("checkout branch", e))?;
        self.vcs.pull(dir).await.map_err(|e| sync_error("pull", e))?;
        self.vcs
            .checkout(dir, commit_hash)
            .await
            .map_err(|e| sync_error("checkout commit", e))?;

        Ok(())
    }

    /// Fetch the project's remote and read the tip of its tracked branch.
    pub async fn fetch_latest_commit(&self, project: &Project) -> Result<CommitInfo> {
        let dir = project.folder_path.as_path();

        self.vcs
            .fetch(dir, &project.remote)
            .await
            .map_err(|e| sync_error("fetch", e))?;

        match self
            .vcs
            .resolve_remote_branch(dir, &project.remote, &project.branch)
            .await
        {
            Ok(commit) => Ok(commit),
            Err(Error::RefNotFound(name)) => {
                error!(project = %project.name, reference = %name, "Remote branch not found");
                Err(Error::RefNotFound(name))
            }
            Err(e) => Err(sync_error("resolve remote branch", e)),
        }
    }
}

fn sync_error(step: &str, err: Error) -> Error {
    error!(step, error = %err, "Sync step failed");
    match err {
        Error::Sync(msg) => Error::Sync(format!("{}: {}", step, msg)),
        other => Error::Sync(format!("{}: {}", step, other)),
    }
}
