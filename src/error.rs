//! Error types for pacer.

/// Top-level error type for the pacer toolkit.
#[derive(Debug, thiserror::Error)]
pub enum PacerError {
    /// Invalid construction-time or file configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Persisted state could not be read, parsed or written.
    #[error("state error: {0}")]
    State(String),

    /// Daily log could not be read or written.
    #[error("log error: {0}")]
    Log(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PacerError>;
