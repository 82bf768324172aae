//! Core domain types and traits for the cibox build runner.
//!
//! This crate contains:
//! - Resource identifiers
//! - Projects, commands, builds and command results
//! - Build status aggregation
//! - Log file layout
//! - Ports for process execution and version control

pub mod build;
pub mod error;
pub mod executor;
pub mod id;
pub mod log;
pub mod status;
pub mod vcs;

pub use build::{Build, Command, CommandResult, Project};
pub use error::{Error, Result};
pub use id::ResourceId;
pub use status::Status;
pub use vcs::CommitInfo;
