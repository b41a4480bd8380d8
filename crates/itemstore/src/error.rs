//! Error types for itemstore and the caches built on it

use std::fmt;
use std::io;

/// Result type alias for item lookups
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for item lookups
#[derive(Debug)]
pub enum Error {
    /// I/O error while reading a backing file
    Io(io::Error),

    /// Malformed record in a backing file
    Parse(String),

    /// No record exists for the key
    NotFound(String),

    /// Attempt to duplicate an identity-bearing object
    IllegalOperation(String),
}

impl Error {
    /// Build a `NotFound` error for any displayable key
    pub fn not_found(key: impl fmt::Display) -> Self {
        Error::NotFound(key.to_string())
    }

    /// Whether this error reports a missing record
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::NotFound(key) => write!(f, "Key not found: {}", key),
            Error::IllegalOperation(msg) => write!(f, "Illegal operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}
