//! Version control port.
//!
//! The build runner only needs a handful of operations against a local
//! working copy; adapters live in `cibox-executor`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// The tip commit of a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub date: DateTime<Utc>,
}

/// Operations against a working copy at `dir`.
///
/// Implementations report failed steps as [`crate::Error::Sync`] and a
/// missing remote branch as [`crate::Error::RefNotFound`].
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Discard local modifications.
    async fn reset_hard(&self, dir: &Path) -> Result<()>;

    /// Check out a branch name or commit hash.
    async fn checkout(&self, dir: &Path, reference: &str) -> Result<()>;

    /// Pull the current branch from its upstream.
    async fn pull(&self, dir: &Path) -> Result<()>;

    /// Fetch refs from `remote`.
    async fn fetch(&self, dir: &Path, remote: &str) -> Result<()>;

    /// Read the tip of `<remote>/<branch>`.
    async fn resolve_remote_branch(
        &self,
        dir: &Path,
        remote: &str,
        branch: &str,
    ) -> Result<CommitInfo>;
}
