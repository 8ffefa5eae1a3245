use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("No response within {0:?}")]
    ResponseTimeout(Duration),

    #[error("Expected response '{expected}', got '{got}'")]
    UnexpectedResponse { expected: char, got: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Terminal name changed from '{was}' to '{now}'")]
    NameChanged { was: String, now: String },

    #[error("Terminal with unrecognized name '{0}'")]
    UnknownTerminal(String),
}

pub type TerminalResult<T> = std::result::Result<T, TerminalError>;
