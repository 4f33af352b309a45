//! Error types for the ledger

use crate::policy::PolicyError;
use crate::types::{Hash, OutputRef};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Transaction rejected by the validator
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Key/owner mismatch while producing fulfillments
    #[error("Signing error: {0}")]
    Signing(String),

    /// Optimistic-concurrency mismatch on a block, vote or spend commit
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Vote chain pointer outdated
    #[error("Stale vote: expected previous block {expected}, got {actual}")]
    StaleVote {
        /// Validator's current head
        expected: Hash,
        /// `previous_block_id` carried by the vote
        actual: Hash,
    },

    /// Policy could not be compiled
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Storage adapter failure
    #[error("Storage error: {0}")]
    Storage(String),

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
    /// Transient errors are safe to retry after re-reading current state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::StaleVote { .. })
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

/// Reasons a transaction is rejected by [`crate::validation::TransactionValidator`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Malformed transaction shape
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// Input references an output already consumed by another transaction
    #[error("Double spend: output {output} already spent by {spent_by}")]
    DoubleSpend {
        /// The contested output
        output: OutputRef,
        /// Transaction that consumed it first
        spent_by: Hash,
    },

    /// Fulfillment does not satisfy the referenced condition
    #[error("Invalid signature on input {input_index}")]
    InvalidSignature {
        /// Offending input position
        input_index: usize,
    },

    /// Matched policy rule evaluated false
    #[error("Policy violation in clause {clause_index}: rule `{rule}` failed (condition `{condition}`)")]
    PolicyViolation {
        /// Position of the selected clause in the policy
        clause_index: usize,
        /// Clause condition source
        condition: String,
        /// Clause rule source
        rule: String,
    },
}

impl ValidationError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Structural(StructuralError::AmountMismatch { .. }) => "conservation",
            ValidationError::Structural(_) => "structural",
            ValidationError::DoubleSpend { .. } => "double_spend",
            ValidationError::InvalidSignature { .. } => "invalid_signature",
            ValidationError::PolicyViolation { .. } => "policy_violation",
        }
    }
}

/// Structural defects, detected before any semantic check
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    /// Stored id differs from the content hash
    #[error("transaction id {actual} does not match content hash {expected}")]
    IdMismatch {
        /// Recomputed content hash
        expected: Hash,
        /// Id carried by the transaction
        actual: Hash,
    },

    /// No inputs
    #[error("transaction has no inputs")]
    NoInputs,

    /// No outputs
    #[error("transaction has no outputs")]
    NoOutputs,

    /// Output with amount 0
    #[error("output {index} has zero amount")]
    ZeroAmount {
        /// Offending output position
        index: usize,
    },

    /// Threshold is 0 or exceeds the number of keys
    #[error("output {index} has threshold {threshold} for {keys} keys")]
    InvalidThreshold {
        /// Offending output position
        index: usize,
        /// Declared threshold
        threshold: u32,
        /// Number of keys in the condition
        keys: usize,
    },

    /// CREATE without an inline asset, or TRANSFER without a reference
    #[error("operation {operation} does not match asset form")]
    AssetMismatch {
        /// `CREATE` or `TRANSFER`
        operation: &'static str,
    },

    /// CREATE input shape is not a single synthetic input
    #[error("CREATE must have exactly one input without a previous output")]
    InvalidCreateInput,

    /// Input with an empty `owners_before`
    #[error("input {index} has no owners")]
    NoOwners {
        /// Offending input position
        index: usize,
    },

    /// TRANSFER input without `fulfills`
    #[error("TRANSFER input {index} does not reference an output")]
    MissingOutputRef {
        /// Offending input position
        index: usize,
    },

    /// Referenced output does not exist
    #[error("input {index} references unknown output {output}")]
    UnknownOutput {
        /// Offending input position
        index: usize,
        /// Unresolved reference
        output: OutputRef,
    },

    /// Two inputs spend the same output
    #[error("output {output} referenced by more than one input")]
    DuplicateInput {
        /// Repeated reference
        output: OutputRef,
    },

    /// `owners_before` differs from the keys of the referenced output
    #[error("input {index} owners do not match the condition of {output}")]
    OwnersMismatch {
        /// Offending input position
        index: usize,
        /// Referenced output
        output: OutputRef,
    },

    /// Declared or consumed asset is not stored
    #[error("unknown asset {asset_id}")]
    UnknownAsset {
        /// Missing asset id
        asset_id: Hash,
    },

    /// Input consumes another lineage without a clause admitting the mix
    #[error("input {index} consumes output of asset {found}, expected {expected}")]
    MixedAssets {
        /// Offending input position
        index: usize,
        /// Asset declared by the transaction
        expected: Hash,
        /// Asset of the consumed output
        found: Hash,
    },

    /// Conservation failure
    #[error("amount mismatch: inputs {inputs}, outputs {outputs}")]
    AmountMismatch {
        /// Sum of consumed amounts
        inputs: u128,
        /// Sum of output amounts
        outputs: u128,
    },

    /// Policy failed to compile
    #[error("invalid policy clause {clause_index}: {message}")]
    InvalidPolicy {
        /// Offending clause position
        clause_index: usize,
        /// Compiler message
        message: String,
    },

    /// Transaction id already stored
    #[error("transaction {tx_id} is already committed")]
    AlreadyCommitted {
        /// Duplicate id
        tx_id: Hash,
    },
}
