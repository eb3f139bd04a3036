use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Unknown archive or compression type: {0}")]
    UnknownFormat(String),

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("No such file or not readable: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    #[error("Unsafe path: {0}")]
    UnsafePath(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl CartonError {
    /// Flattens into an `io::Error` for use inside `Read`/`Write` impls.
    pub fn into_io(self) -> std::io::Error {
        match self {
            CartonError::Io(e) => e,
            other => std::io::Error::other(other.to_string()),
        }
    }
}

pub(crate) fn format_err(msg: impl Into<String>) -> CartonError {
    CartonError::Format(msg.into())
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, CartonError>;
