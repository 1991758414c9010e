//! Error types for the tinyimg library.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for tinyimg operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading, transforming, or re-encoding an image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The byte source or sink could not be read or written.
    #[error("I/O error on {}: {source}", display_path(.path))]
    Io {
        /// Path involved, when the source or sink is a file.
        path: Option<PathBuf>,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Malformed or unsupported input container.
    #[error("Format error: {0}")]
    Format(String),
    /// The requested transform cannot be applied to this image.
    #[error("Transform error: {0}")]
    Transform(String),
    /// Internal compression failure.
    #[error("Compression error: {0}")]
    Compression(String),
    /// Internal serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The deadline passed before any usable candidate was produced.
    #[error("Timed out after {elapsed:.2?} without producing a candidate")]
    Timeout {
        /// Time spent before giving up.
        elapsed: Duration,
    },
}

/// Tag identifying the kind of an [`Error`], without its detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Io`].
    Io,
    /// See [`Error::Format`].
    Format,
    /// See [`Error::Transform`].
    Transform,
    /// See [`Error::Compression`].
    Compression,
    /// See [`Error::Serialization`].
    Serialization,
    /// See [`Error::Timeout`].
    Timeout,
}

impl Error {
    /// The tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::Io,
            Error::Format(_) => ErrorKind::Format,
            Error::Transform(_) => ErrorKind::Transform,
            Error::Compression(_) => ErrorKind::Compression,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub(crate) fn io(path: Option<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path, source }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "<memory>".to_string(),
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "IoError",
            ErrorKind::Format => "FormatError",
            ErrorKind::Transform => "TransformError",
            ErrorKind::Compression => "CompressionError",
            ErrorKind::Serialization => "SerializationError",
            ErrorKind::Timeout => "TimeoutError",
        };
        f.write_str(name)
    }
}
