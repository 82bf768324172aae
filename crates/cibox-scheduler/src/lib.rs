//! Build execution for cibox.
//!
//! Synchronizes a project's working copy to a build's commit and runs the
//! project's commands one after another, skipping the rest once a command
//! fails.

pub mod locks;
pub mod orchestrator;
pub mod sync;

#[cfg(test)]
mod testing;

pub use locks::LockRegistry;
pub use orchestrator::{BuildEvent, BuildOrchestrator, RunSettings};
pub use sync::CommitSynchronizer;
