//! Git working copies driven through the `git` binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cibox_core::vcs::{CommitInfo, Vcs};
use cibox_core::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// `Vcs` implementation that shells out to `git`.
pub struct GitCli {
    git_bin: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        let git_bin = std::env::var("CIBOX_GIT_BIN").unwrap_or_else(|_| "git".to_string());
        Self { git_bin }
    }

    /// Run git in `dir` and return its stdout.
    async fn git(&self, dir: &Path, args: &[&str]) -> std::result::Result<String, GitError> {
        debug!(dir = %dir.display(), ?args, "Running git");

        let output = Command::new(&self.git_bin)
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(?args, stderr = %stderr, "Git command failed");
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a sync step, reporting failure as [`Error::Sync`].
    async fn step(&self, dir: &Path, args: &[&str]) -> Result<()> {
        self.git(dir, args)
            .await
            .map(|_| ())
            .map_err(|e| Error::Sync(e.to_string()))
    }
}

/// Refuse values git would read as an option.
fn plain_arg<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() || value.starts_with('-') {
        return Err(Error::Sync(format!("invalid {} {:?}", what, value)));
    }
    Ok(value)
}

const FIELD_SEP: char = '\u{0}';

/// Parse `git log -1 --format=%H%x00%an%x00%aI%x00%B` output.
fn parse_commit(output: &str) -> std::result::Result<CommitInfo, GitError> {
    let mut fields = output.splitn(4, FIELD_SEP);
    let (Some(hash), Some(author), Some(date), Some(message)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(GitError::UnexpectedOutput(output.to_string()));
    };

    let date = DateTime::parse_from_rfc3339(date.trim())
        .map_err(|e| GitError::UnexpectedOutput(format!("commit date {:?}: {}", date, e)))?
        .with_timezone(&Utc);

    Ok(CommitInfo {
        hash: hash.trim().to_string(),
        message: message.trim_end().to_string(),
        author: author.to_string(),
        date,
    })
}

#[async_trait]
impl Vcs for GitCli {
    async fn reset_hard(&self, dir: &Path) -> Result<()> {
        self.step(dir, &["reset", "--hard"]).await
    }

    async fn checkout(&self, dir: &Path, reference: &str) -> Result<()> {
        let reference = plain_arg("reference", reference)?;
        self.step(dir, &["checkout", "--quiet", reference]).await
    }

    async fn pull(&self, dir: &Path) -> Result<()> {
        self.step(dir, &["pull", "--ff-only"]).await
    }

    async fn fetch(&self, dir: &Path, remote: &str) -> Result<()> {
        let remote = plain_arg("remote", remote)?;
        self.step(dir, &["fetch", "--quiet", remote]).await
    }

    async fn resolve_remote_branch(
        &self,
        dir: &Path,
        remote: &str,
        branch: &str,
    ) -> Result<CommitInfo> {
        let tracking = format!("refs/remotes/{}/{}", remote, branch);
        let spec = format!("{}^{{commit}}", tracking);

        let hash = match self
            .git(dir, &["rev-parse", "--verify", "--quiet", &spec])
            .await
        {
            Ok(hash) => hash.trim().to_string(),
            Err(GitError::CommandFailed { .. }) => {
                return Err(Error::RefNotFound(format!("{}/{}", remote, branch)));
            }
            Err(e) => return Err(Error::Sync(e.to_string())),
        };

        let output = self
            .git(
                dir,
                &["log", "-1", "--format=%H%x00%an%x00%aI%x00%B", &hash],
            )
            .await
            .map_err(|e| Error::Sync(e.to_string()))?;
        let commit = parse_commit(&output).map_err(|e| Error::Sync(e.to_string()))?;

        info!(remote, branch, hash = %commit.hash, "Resolved remote branch");
        Ok(commit)
    }
}

/// Git operation errors.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("unexpected git output: {0}")]
    UnexpectedOutput(String),
}
