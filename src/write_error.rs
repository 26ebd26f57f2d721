//! Bitstream write errors.

use std::error::Error;

/// Errors that can occur when writing OGG bitstreams.
#[derive(Debug)]
pub enum WriteError {
    /// A `std::io::Error`.
    IoError(std::io::Error),
    /// A `std::num::TryFromIntError`.
    TryFromIntError(std::num::TryFromIntError),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::IoError(err) => {
                write!(f, "{}", err)
            }
            WriteError::TryFromIntError(err) => {
                write!(f, "{}", err)
            }
        }
    }
}

impl From<std::io::Error> for WriteError {
    fn from(err: std::io::Error) -> WriteError {
        WriteError::IoError(err)
    }
}

impl From<std::num::TryFromIntError> for WriteError {
    fn from(err: std::num::TryFromIntError) -> WriteError {
        WriteError::TryFromIntError(err)
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            WriteError::IoError(ref e) => Some(e),
            WriteError::TryFromIntError(ref e) => Some(e),
        }
    }
}
