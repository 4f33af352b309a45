//! Canonical serialization for content addressing
//!
//! Ensures a deterministic byte representation for ids and signatures.
//! Fixed field order, length-prefixed variable data, inputs/outputs kept in
//! declaration order. JSON documents are rendered with sorted object keys.

use crate::types::{
    AssetPayload, Condition, ConservationMode, Fulfillment, Hash, Input, Output, OutputRef,
    Policy, PublicKey, TxAsset,
};
use sha2::{Digest, Sha256};

/// Canonical serializer
#[derive(Debug, Default)]
pub struct CanonicalSerializer {
    buffer: Vec<u8>,
}

impl CanonicalSerializer {
    /// Create new serializer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a single tag byte
    pub fn write_u8(&mut self, n: u8) {
        self.buffer.push(n);
    }

    /// Write u32 (big-endian)
    pub fn write_u32(&mut self, n: u32) {
        self.write_bytes(&n.to_be_bytes());
    }

    /// Write u64 (big-endian)
    pub fn write_u64(&mut self, n: u64) {
        self.write_bytes(&n.to_be_bytes());
    }

    /// Write i64 (big-endian)
    pub fn write_i64(&mut self, n: i64) {
        self.write_bytes(&n.to_be_bytes());
    }

    /// Write string (length-prefixed)
    pub fn write_string(&mut self, s: &str) {
        self.write_len(s.len());
        self.write_bytes(s.as_bytes());
    }

    /// Write collection length
    pub fn write_len(&mut self, len: usize) {
        self.write_u64(len as u64);
    }

    /// Write bool
    pub fn write_bool(&mut self, b: bool) {
        self.write_u8(b as u8);
    }

    /// Write optional string
    pub fn write_option_string(&mut self, opt: Option<&str>) {
        match opt {
            Some(s) => {
                self.write_u8(1);
                self.write_string(s);
            }
            None => self.write_u8(0),
        }
    }

    /// Write a JSON document (object keys sorted)
    pub fn write_json(&mut self, value: &serde_json::Value) {
        // serde_json keeps maps ordered by key, so rendering is stable
        self.write_string(&value.to_string());
    }

    /// Write hash
    pub fn write_hash(&mut self, hash: &Hash) {
        self.write_bytes(hash.as_bytes());
    }

    /// Write public key list
    pub fn write_keys(&mut self, keys: &[PublicKey]) {
        self.write_len(keys.len());
        for key in keys {
            self.write_bytes(key.as_bytes());
        }
    }

    /// Finalize and return bytes
    pub fn finalize(self) -> Vec<u8> {
        self.buffer
    }

    /// Compute SHA-256 hash
    pub fn hash(self) -> Hash {
        hash_bytes(&self.buffer)
    }
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash::from_bytes(hasher.finalize().into())
}

/// Types with a fixed canonical encoding
pub(crate) trait WriteCanonical {
    fn write_canonical(&self, ser: &mut CanonicalSerializer);
}

impl WriteCanonical for OutputRef {
    fn write_canonical(&self, ser: &mut CanonicalSerializer) {
        ser.write_hash(&self.tx_id);
        ser.write_u32(self.index);
    }
}

impl WriteCanonical for Condition {
    fn write_canonical(&self, ser: &mut CanonicalSerializer) {
        ser.write_u32(self.threshold);
        ser.write_keys(&self.public_keys);
    }
}

impl WriteCanonical for Output {
    fn write_canonical(&self, ser: &mut CanonicalSerializer) {
        ser.write_u64(self.amount);
        self.condition.write_canonical(ser);
    }
}

impl WriteCanonical for Fulfillment {
    fn write_canonical(&self, ser: &mut CanonicalSerializer) {
        ser.write_len(self.signatures.len());
        for entry in &self.signatures {
            ser.write_bytes(entry.public_key.as_bytes());
            ser.write_bytes(entry.signature.as_bytes());
        }
    }
}

impl WriteCanonical for Policy {
    fn write_canonical(&self, ser: &mut CanonicalSerializer) {
        ser.write_len(self.clauses.len());
        for clause in &self.clauses {
            ser.write_string(&clause.condition);
            ser.write_string(&clause.rule);
            ser.write_u8(match clause.conservation {
                ConservationMode::Implicit => 0,
                ConservationMode::Override => 1,
                ConservationMode::Enforce => 2,
            });
        }
    }
}

impl WriteCanonical for AssetPayload {
    fn write_canonical(&self, ser: &mut CanonicalSerializer) {
        ser.write_option_string(self.kind.as_deref());
        ser.write_json(&self.data);
        match &self.policy {
            Some(policy) => {
                ser.write_u8(1);
                policy.write_canonical(ser);
            }
            None => ser.write_u8(0),
        }
    }
}

impl WriteCanonical for TxAsset {
    fn write_canonical(&self, ser: &mut CanonicalSerializer) {
        match self {
            TxAsset::Inline(payload) => {
                ser.write_u8(1);
                payload.write_canonical(ser);
            }
            TxAsset::Reference { id } => {
                ser.write_u8(2);
                ser.write_hash(id);
            }
        }
    }
}

/// Write an input, optionally including its fulfillment
pub(crate) fn write_input(ser: &mut CanonicalSerializer, input: &Input, with_fulfillment: bool) {
    match &input.fulfills {
        Some(output) => {
            ser.write_u8(1);
            output.write_canonical(ser);
        }
        None => ser.write_u8(0),
    }
    ser.write_keys(&input.owners_before);
    if with_fulfillment {
        match &input.fulfillment {
            Some(fulfillment) => {
                ser.write_u8(1);
                fulfillment.write_canonical(ser);
            }
            None => ser.write_u8(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"test data"), hash_bytes(b"test data"));
        assert_ne!(hash_bytes(b"test data"), hash_bytes(b"different data"));
    }

    #[test]
    fn test_strings_are_length_prefixed() {
        // "ab" + "c" must not collide with "a" + "bc"
        let mut left = CanonicalSerializer::new();
        left.write_string("ab");
        left.write_string("c");

        let mut right = CanonicalSerializer::new();
        right.write_string("a");
        right.write_string("bc");

        assert_ne!(left.hash(), right.hash());
    }

    #[test]
    fn test_json_key_order_is_stable() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();

        let mut left = CanonicalSerializer::new();
        left.write_json(&a);
        let mut right = CanonicalSerializer::new();
        right.write_json(&b);

        assert_eq!(left.finalize(), right.finalize());
    }
}
