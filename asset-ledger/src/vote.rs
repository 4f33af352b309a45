//! Validator votes on block validity

use crate::canonical::CanonicalSerializer;
use crate::types::{Hash, PublicKey, Signature};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One validator's signed assertion about one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Voting validator
    pub validator_id: PublicKey,

    /// Block being judged
    pub block_id: Hash,

    /// Block the validator last voted valid (its chain head)
    pub previous_block_id: Hash,

    /// Verdict
    pub is_valid: bool,

    /// Casting time
    pub timestamp: DateTime<Utc>,

    /// Validator signature over every other field
    pub signature: Signature,
}

impl Vote {
    /// Bytes covered by the signature
    pub fn signing_payload(
        validator_id: &PublicKey,
        block_id: &Hash,
        previous_block_id: &Hash,
        is_valid: bool,
        timestamp: &DateTime<Utc>,
    ) -> Vec<u8> {
        let mut ser = CanonicalSerializer::new();
        ser.write_bytes(validator_id.as_bytes());
        ser.write_hash(block_id);
        ser.write_hash(previous_block_id);
        ser.write_bool(is_valid);
        ser.write_i64(timestamp.timestamp_millis());
        ser.finalize()
    }

    /// Signing payload of this vote
    pub fn payload(&self) -> Vec<u8> {
        Self::signing_payload(
            &self.validator_id,
            &self.block_id,
            &self.previous_block_id,
            self.is_valid,
            &self.timestamp,
        )
    }
}

/// Outcome of counting votes for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    /// Majority voted valid
    Valid,
    /// Enough invalid votes that a valid majority is impossible
    Invalid,
    /// Neither yet
    Undecided,
}
