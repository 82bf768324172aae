//! Adapters for the cibox build runner:
//! - Shell process runner
//! - Git working copies via the `git` binary

pub mod git;
pub mod shell;

pub use cibox_core::executor::{CommandRunner, EnvPolicy, ExecOutcome, ShellJob};
pub use git::{GitCli, GitError};
pub use shell::ShellRunner;
