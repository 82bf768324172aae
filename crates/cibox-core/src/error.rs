//! Error types for cibox.

use std::path::PathBuf;

use thiserror::Error;

use crate::Status;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sync failed: {0}")]
    Sync(String),

    #[error("remote ref not found: {0}")]
    RefNotFound(String),

    #[error("cannot read log {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("illegal transition from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
