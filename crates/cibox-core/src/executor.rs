//! Process execution port.
//!
//! Commands are shell strings run inside a project's working copy with
//! output redirected to the result's log file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::Result;

/// A shell command to execute for one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellJob {
    /// Shell string, passed to `sh -c`.
    pub script: String,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
    /// File receiving stdout and stderr. Truncated before the run.
    pub log_path: PathBuf,
    /// Kill the command after this long.
    pub timeout: Option<Duration>,
}

/// Environment normalization applied before every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvPolicy {
    /// Variables removed from the inherited environment.
    pub unset: Vec<String>,
    /// Scripts sourced before the command when they exist and are non-empty.
    /// Shell variables such as `$HOME` are expanded. A script that fails to
    /// source does not fail the command.
    pub source: Vec<String>,
}

impl Default for EnvPolicy {
    fn default() -> Self {
        Self {
            unset: ["RAILS_ENV", "RUBYOPT", "BUNDLE_GEMFILE", "BUNDLE_BIN_PATH"]
                .into_iter()
                .map(String::from)
                .collect(),
            source: vec!["$HOME/.rvm/scripts/rvm".to_string()],
        }
    }
}

impl EnvPolicy {
    /// A policy that leaves the environment alone.
    pub fn inherit() -> Self {
        Self {
            unset: Vec::new(),
            source: Vec::new(),
        }
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Succeeded,
    /// Non-zero exit. `exit_code` is `None` when killed by a signal.
    Failed { exit_code: Option<i32> },
    TimedOut,
}

impl ExecOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecOutcome::Succeeded)
    }
}

/// Trait for command runners.
///
/// An `Err` means the command could not be run at all (spawn failure, log
/// file not writable). Callers record it the same way as a failed command.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, job: &ShellJob, policy: &EnvPolicy) -> Result<ExecOutcome>;
}
