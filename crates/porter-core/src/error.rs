use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown access target: {0}")]
    UnknownTarget(String),

    #[error("Unknown user level: {0}")]
    UnknownUserLevel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
