//! File-backed documents with hot reload.
//!
//! A [`SyncedDocument`] pairs an in-memory value with one file. `load()` makes
//! the value match the file (or repairs the file from the value when it is
//! missing or unreadable), `save()` writes the value out, and `watch()` turns
//! external edits into reload requests.
//!
//! Writes made by the document itself must not come back as reload requests.
//! Every internal write holds a [`WriteGate`]: while held, and for a settle
//! delay afterwards, watcher events are discarded rather than queued.

mod codec;
mod document;
mod gate;
mod watch;

use std::{io, path::PathBuf, result::Result as StdResult};

pub use codec::{Codec, CodecError, Decoded, TomlCodec, YamlCodec};
pub use document::{Document, LoadOutcome, SyncedDocument};
pub use gate::{GateGuard, WriteGate, default_settle_delay};
pub use watch::{DEFAULT_DEBOUNCE, DocumentWatch};

use thiserror::Error;

/// Errors produced while reading, writing or watching a document.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure other than "file not found".
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The value could not be serialized.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The filesystem watcher could not be created or attached.
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
    /// The document path does not name a file.
    #[error("document path has no file name: {}", .0.display())]
    NoFileName(PathBuf),
    /// The watch dispatcher thread could not be spawned.
    #[error("failed to spawn watch thread: {0}")]
    ThreadSpawn(#[source] io::Error),
}

/// Convenient result type for document operations.
pub type Result<T> = StdResult<T, Error>;
