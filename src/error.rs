//! Error types for the story indexer and sync server.
//!
//! Only [`StoryError::ManifestUnavailable`] is meant to escape to the process
//! level. Extraction, file-read and channel-send failures are recovered where
//! they happen and logged.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoryError {
    /// The manifest document is missing or is not valid JSON.
    #[error("Story manifest unavailable at {path}: {reason}")]
    ManifestUnavailable { path: PathBuf, reason: String },

    /// The manifest could not be written back to disk.
    #[error("Failed to write {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The generated loader artifact could not be written.
    #[error("Failed to write loader artifact {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A story file could not be parsed into exports.
    #[error("Failed to extract stories from {relative_path}: {reason}")]
    Extraction {
        relative_path: String,
        reason: String,
    },

    /// A changed story file could not be read.
    #[error("Failed to read {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A push channel client went away before a message could be queued.
    #[error("Push channel send failed: {reason}")]
    ChannelSend { reason: String },

    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoryError>;
