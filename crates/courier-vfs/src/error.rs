//! Filesystem error types.

use std::io;
use thiserror::Error;

use crate::store::StoreError;

/// Filesystem error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Neither an object nor any child keys exist at the path.
    #[error("no such file: {0}")]
    NotFound(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Malformed argument (wrong scheme, path from another filesystem, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Name index or subpath range outside the path's name elements.
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    /// Operation the bucket filesystem does not provide.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Unknown or already closed handle.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Object store call failed.
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an IndexOutOfRange error.
    pub fn index_out_of_range(msg: impl Into<String>) -> Self {
        Self::IndexOutOfRange(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(what: &'static str) -> Self {
        Self::Unsupported(what)
    }

    /// Create an InvalidHandle error.
    pub fn invalid_handle(handle: impl Into<String>) -> Self {
        Self::InvalidHandle(handle.into())
    }

    /// Returns true for the not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

/// Convert VfsError to std::io::Error for the protocol boundary.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::IndexOutOfRange(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Unsupported(what) => io::Error::new(io::ErrorKind::Unsupported, what),
            VfsError::InvalidHandle(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Store(e) => io::Error::other(e),
            VfsError::Io(e) => e,
        }
    }
}

/// Filesystem result type.
pub type VfsResult<T> = Result<T, VfsError>;
