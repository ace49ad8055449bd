//! Error types for reconstruction runs.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while configuring, inserting, reducing or finishing
/// a reconstruction.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Image {index} has no CTF descriptor, but CTF weighting is enabled")]
    MissingCtf { index: usize },

    #[error("Invalid image {index}: {reason}")]
    InvalidImage { index: usize, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Collective protocol error: {0}")]
    CollectiveProtocol(String),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to parse '{text}' on line {line}: {reason}")]
    Parse { line: usize, text: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Everything except a missing half-set aborts the run.
    pub fn is_fatal(&self) -> bool { !matches!(self, Error::InsufficientData(_)) }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}
