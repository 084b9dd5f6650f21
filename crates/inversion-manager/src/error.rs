//! Application error type.

use std::{io, result::Result as StdResult};

use thiserror::Error;

/// Errors surfaced by application startup and the main loop.
#[derive(Debug, Error)]
pub enum Error {
    /// A rule could not be built.
    #[error(transparent)]
    Rules(#[from] filter_rules::Error),
    /// A backing file could not be read, written or watched.
    #[error(transparent)]
    Document(#[from] synced_doc::Error),
    /// Main executor misuse.
    #[error(transparent)]
    Executor(#[from] main_exec::Error),
    /// Focus tracking could not start.
    #[error("focus tracking unavailable: {0}")]
    Focus(#[from] win_focus_watcher::Error),
    /// Runtime or thread setup failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convenient result type.
pub type Result<T> = StdResult<T, Error>;
