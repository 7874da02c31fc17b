use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// The configuration is valid but no implementation supports it.
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl PrimitiveError {
    pub fn unimplemented(msg: impl Into<String>) -> Self {
        PrimitiveError::Unimplemented(msg.into())
    }

    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        PrimitiveError::InvalidArguments(msg.into())
    }

    /// Returns the status code this error surfaces as.
    pub fn status(&self) -> Status {
        match self {
            PrimitiveError::Unimplemented(_) => Status::Unimplemented,
            PrimitiveError::InvalidArguments(_) => Status::InvalidArguments,
        }
    }
}

/// Status codes surfaced by the primitive layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Unimplemented,
    InvalidArguments,
}

impl Status {
    /// Maps a result onto its status code.
    pub fn of<T>(result: &Result<T>) -> Status {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Unimplemented => write!(f, "unimplemented"),
            Status::InvalidArguments => write!(f, "invalid_arguments"),
        }
    }
}

pub type Result<T> = std::result::Result<T, PrimitiveError>;
