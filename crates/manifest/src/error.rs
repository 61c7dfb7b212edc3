//! Error types for the manifest crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building or diffing a manifest
#[derive(Error, Debug)]
pub enum Error {
    /// Reading the on-disk state of a file failed for a reason other than absence
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest entry with an absolute path
    #[error("manifest path must be relative: {0}")]
    AbsolutePath(String),

    /// Manifest entry with empty content
    #[error("manifest entry has empty content: {0}")]
    EmptyContent(String),

    /// The same relative path declared twice
    #[error("manifest path declared more than once: {0}")]
    DuplicatePath(String),
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, Error>;
