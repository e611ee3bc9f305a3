use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImmoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or truncated input. Aborts the record source.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Build cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ImmoError>;
