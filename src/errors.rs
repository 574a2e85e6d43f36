use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, ClipError>;
