//! Error types for consensus

use asset_ledger::{Hash, ValidationError};
use thiserror::Error;

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Consensus errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error (validation, conflicts, stale votes, storage)
    #[error("Ledger error: {0}")]
    Ledger(#[from] asset_ledger::Error),

    /// Block failed the well-formedness check
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    /// Vote signature does not verify
    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    /// Block id not found in storage
    #[error("Unknown block: {0}")]
    UnknownBlock(Hash),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Conflict or stale vote; safe to retry after re-reading state
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Ledger(e) if e.is_retryable())
    }

    /// Validation failure carried by this error, if any
    pub fn validation_error(&self) -> Option<&ValidationError> {
        match self {
            Error::Ledger(asset_ledger::Error::Validation(e)) => Some(e),
            _ => None,
        }
    }

    /// Short label for logs and node output
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Ledger(asset_ledger::Error::Validation(e)) => e.kind(),
            Error::Ledger(asset_ledger::Error::Conflict(_)) => "conflict",
            Error::Ledger(asset_ledger::Error::StaleVote { .. }) => "stale_vote",
            Error::InvalidBlock(_) => "invalid_block",
            Error::InvalidVote(_) => "invalid_vote",
            Error::UnknownBlock(_) => "unknown_block",
            Error::Serialization(_) => "malformed",
            _ => "internal",
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Ledger(asset_ledger::Error::Validation(e))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
