//! Error taxonomy for Todoke.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TodokeError>;

/// All error categories surfaced across the workspace.
///
/// Non-evaluable submissions are deliberately NOT errors — the decision
/// engine reports them as skips and the reconciliation loop retries them on
/// the next run.
#[derive(Debug, Error)]
pub enum TodokeError {
    /// Configuration load/parse failure.
    #[error("Config error: {0}")]
    Config(String),

    /// Store read/write failure. Listing failures abort a reconciliation run.
    #[error("Store error: {0}")]
    Store(String),

    /// A single delivery attempt failed (bad recipient, transport rejection,
    /// timeout). Caught per submission, never fatal to the run.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A record read from the store violates the data model.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
