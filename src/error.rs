//! The error taxonomy for the core: kinds, not ad hoc strings.
use std::path::PathBuf;

use thiserror::Error;

/// Everything the core can fail with. Callers that need to tell a recoverable
/// `NotFound` from a fatal `IoError` match on this directly; the CLI wraps it
/// in `anyhow` for display and doesn't otherwise need the variants.
#[derive(Error, Debug)]
pub enum Error {
    /// The Generator's root path does not exist or is not a directory.
    #[error("'{0}' does not exist or is not a directory")]
    NotADirectory(PathBuf),

    /// An entry is neither file, directory, nor symlink (device, FIFO, socket, ...).
    #[error("'{0}' is neither a file, directory, nor symlink")]
    InvalidEntry(PathBuf),

    /// Permission or read/open failure below the root, propagated unless `continue_on_error`.
    #[error("I/O error at '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk document is missing a sentinel, carries an unknown kind tag,
    /// or otherwise fails to parse.
    #[error("malformed dmerk document: {0}")]
    MalformedDocument(String),

    /// `traverse` found no descendant at the given sub-path.
    #[error("no sub-merkle found for path '{0}'")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
