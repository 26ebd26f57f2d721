//! Errors surfaced by the chop, comment and sort engines.

use std::error::Error;

use crate::{ReadError, WriteError};

/// Errors that can occur while one of the engines processes a container.
#[derive(Debug)]
pub enum ToolError {
    /// Reading or deframing the input failed.
    Read(ReadError),
    /// Assembling output pages failed.
    Write(WriteError),
    /// Writing to the output sink failed.
    Io(std::io::Error),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::Read(err) => write!(f, "{}", err),
            ToolError::Write(err) => write!(f, "{}", err),
            ToolError::Io(err) => write!(f, "{}", err),
        }
    }
}

impl From<ReadError> for ToolError {
    fn from(err: ReadError) -> ToolError {
        ToolError::Read(err)
    }
}

impl From<WriteError> for ToolError {
    fn from(err: WriteError) -> ToolError {
        ToolError::Write(err)
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> ToolError {
        ToolError::Io(err)
    }
}

impl Error for ToolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            ToolError::Read(ref e) => Some(e),
            ToolError::Write(ref e) => Some(e),
            ToolError::Io(ref e) => Some(e),
        }
    }
}
