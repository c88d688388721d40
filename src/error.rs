use std::io;

use thiserror::Error;

/// Errors that can occur during virtual file system operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// The path is malformed (empty, contains `..`, or other normalization failure).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No entry exists at the requested path in any mount or the overlay.
    #[error("not found: {0}")]
    NotFound(String),

    /// No provider recognized the physical file format.
    #[error("no provider can read \"{0}\"")]
    UnsupportedFormat(String),

    /// An archive's header matched but its entry table could not be read.
    #[error("corrupt archive \"{path}\": {reason}")]
    CorruptArchive { path: String, reason: String },

    /// The overlay area could not be accessed or is protected.
    #[error("cannot access \"{0}\"")]
    AccessError(String),

    /// The operation is not supported by this stream or backend.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// An IO error occurred while accessing a provider.
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            VfsError::NotFound(err.to_string())
        } else {
            VfsError::Io(err)
        }
    }
}

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::Io(io) => io,
            VfsError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            VfsError::NotSupported(_) => io::Error::new(io::ErrorKind::Unsupported, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
