//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - The [`CryptoAdapter`] port consumed by the model and the validator
//! - [`Ed25519Crypto`], the reference adapter (Ed25519 via `ed25519-dalek`)
//! - [`KeyPair`] for tests and node bootstrap

use crate::types::{Condition, Fulfillment, KeySignature, PublicKey, Signature};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use std::collections::HashSet;
use std::fmt;

/// Ed25519 secret seed. Never serialized, redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    /// Create from seed bytes
    pub fn from_bytes(seed: [u8; 32]) -> Self {
        Self(seed)
    }

    /// Parse a hex-encoded seed
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(s, &mut seed)?;
        Ok(Self(seed))
    }

    /// Get seed bytes (USE WITH CAUTION - should be protected)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Sign/verify port. Implementations must be deterministic and side-effect free.
pub trait CryptoAdapter: Send + Sync {
    /// Sign `payload`, returning the signer's contribution to a fulfillment
    fn sign(&self, payload: &[u8], private_key: &PrivateKey) -> KeySignature;

    /// True when `fulfillment` satisfies `condition` over `payload`
    fn verify(&self, condition: &Condition, fulfillment: &Fulfillment, payload: &[u8]) -> bool;

    /// Public key belonging to `private_key`
    fn public_key(&self, private_key: &PrivateKey) -> PublicKey;
}

/// Reference Ed25519 adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Crypto;

impl Ed25519Crypto {
    /// Verify a single signature
    pub fn verify_signature(payload: &[u8], entry: &KeySignature) -> bool {
        let verifying_key = match VerifyingKey::from_bytes(entry.public_key.as_bytes()) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = DalekSignature::from_bytes(entry.signature.as_bytes());
        verifying_key.verify(payload, &signature).is_ok()
    }
}

impl CryptoAdapter for Ed25519Crypto {
    fn sign(&self, payload: &[u8], private_key: &PrivateKey) -> KeySignature {
        let signing_key = SigningKey::from_bytes(private_key.as_bytes());
        let signature = signing_key.sign(payload);
        KeySignature {
            public_key: PublicKey::from_bytes(signing_key.verifying_key().to_bytes()),
            signature: Signature::from_bytes(signature.to_bytes()),
        }
    }

    fn verify(&self, condition: &Condition, fulfillment: &Fulfillment, payload: &[u8]) -> bool {
        if condition.threshold == 0 {
            return false;
        }

        let eligible: HashSet<&PublicKey> = condition.public_keys.iter().collect();
        let mut counted: HashSet<&PublicKey> = HashSet::new();

        for entry in &fulfillment.signatures {
            // Signatures from outsiders or repeated signers never count
            if !eligible.contains(&entry.public_key) || counted.contains(&entry.public_key) {
                return false;
            }
            if !Self::verify_signature(payload, entry) {
                return false;
            }
            counted.insert(&entry.public_key);
        }

        counted.len() >= condition.threshold as usize
    }

    fn public_key(&self, private_key: &PrivateKey) -> PublicKey {
        let signing_key = SigningKey::from_bytes(private_key.as_bytes());
        PublicKey::from_bytes(signing_key.verifying_key().to_bytes())
    }
}

/// Ed25519 key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let private_key = PrivateKey::from_bytes(*seed);
        let public_key = Ed25519Crypto.public_key(&private_key);

        Self {
            private_key,
            public_key,
        }
    }

    /// Get public key
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Get private key
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}
