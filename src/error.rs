use thiserror::Error;

/// Crate-wide error type, one variant per error kind in the design doc.
#[derive(Debug, Error)]
pub enum KonvahtiError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("source refresh failed: {0}")]
    Source(#[source] anyhow::Error),

    #[error("command exited with non-zero status code {code}")]
    CommandFailed { code: i32 },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("directory swap failed: {0}")]
    Swap(#[source] std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KonvahtiError>;
