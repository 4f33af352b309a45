//! Core value types for the ledger
//!
//! All types are designed for:
//! - Deterministic hashing (see [`crate::canonical`])
//! - JSON wire form with hex-encoded keys, signatures and ids
//! - Immutability once a transaction is signed

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Byte length
            pub const LEN: usize = $len;

            /// Create from bytes
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Get bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_bytes!(
    /// SHA-256 content hash (transaction, asset and block ids)
    Hash,
    32
);

hex_bytes!(
    /// Ed25519 verifying key
    PublicKey,
    32
);

hex_bytes!(
    /// Ed25519 signature
    Signature,
    64
);

impl Hash {
    /// "No previous block" reference
    pub const GENESIS: Hash = Hash([0u8; 32]);

    /// True for the genesis reference
    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }
}

/// Arbitrary per-transaction key/value document
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Pointer to a specific output of a prior transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    /// Transaction holding the output
    pub tx_id: Hash,
    /// Output position
    pub index: u32,
}

impl OutputRef {
    /// Create new output reference
    pub fn new(tx_id: Hash, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

/// Keys and threshold required to spend an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Eligible signers
    pub public_keys: Vec<PublicKey>,
    /// Number of distinct valid signatures required
    pub threshold: u32,
}

impl Condition {
    /// Every listed key must sign
    pub fn all_of(public_keys: Vec<PublicKey>) -> Self {
        let threshold = public_keys.len() as u32;
        Self {
            public_keys,
            threshold,
        }
    }

    /// Single-signer condition
    pub fn single(public_key: PublicKey) -> Self {
        Self::all_of(vec![public_key])
    }
}

/// Divisible share count locked by a condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Share count (strictly positive)
    pub amount: u64,
    /// Spending condition
    pub condition: Condition,
}

impl Output {
    /// Output spendable only when all `public_keys` sign
    pub fn new(public_keys: Vec<PublicKey>, amount: u64) -> Self {
        Self {
            amount,
            condition: Condition::all_of(public_keys),
        }
    }

    /// Override the signature threshold
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.condition.threshold = threshold;
        self
    }

    /// Keys named by the condition
    pub fn public_keys(&self) -> &[PublicKey] {
        &self.condition.public_keys
    }
}

/// One signer's contribution to a fulfillment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    /// Signer
    pub public_key: PublicKey,
    /// Signature over the transaction's signing payload
    pub signature: Signature,
}

/// Cryptographic proof satisfying a [`Condition`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fulfillment {
    /// Signatures in owner order
    pub signatures: Vec<KeySignature>,
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Output being spent (`None` for the synthetic CREATE input)
    pub fulfills: Option<OutputRef>,
    /// Identities expected to satisfy the referenced condition
    pub owners_before: Vec<PublicKey>,
    /// Proof data, absent until signed
    #[serde(default)]
    pub fulfillment: Option<Fulfillment>,
}

/// Operation tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Operation {
    /// Defines a new asset
    Create = 1,
    /// Moves shares of an existing asset
    Transfer = 2,
}

impl Operation {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a matched clause interacts with the default conservation check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConservationMode {
    /// Override only when the rule constrains `AMOUNT(...)` itself
    #[default]
    Implicit = 0,
    /// Always replace conservation with the rule
    Override = 1,
    /// Always enforce conservation in addition to the rule
    Enforce = 2,
}

/// Rule clause as attached by the asset creator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Selects the clause for a transaction
    pub condition: String,
    /// Must hold for a selected transaction
    pub rule: String,
    /// Conservation behaviour for transactions this clause selects
    #[serde(default)]
    pub conservation: ConservationMode,
}

impl Clause {
    /// Clause with implicit conservation behaviour
    pub fn new(condition: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            rule: rule.into(),
            conservation: ConservationMode::Implicit,
        }
    }
}

/// Ordered clause list inherited by an asset's whole lineage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy {
    /// Clauses in declaration order
    pub clauses: Vec<Clause>,
}

impl Policy {
    /// Create from clauses
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    /// No clauses
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Immutable creation payload of an asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetPayload {
    /// Free-form type tag
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Opaque data document
    #[serde(default)]
    pub data: serde_json::Value,
    /// Business-logic contract for the lineage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
}

impl AssetPayload {
    /// Payload with a type tag and data document
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: Some(kind.into()),
            data,
            policy: None,
        }
    }

    /// Attach a policy
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Asset as resolved from storage
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Id of the defining CREATE transaction
    pub id: Hash,
    /// Creation payload
    pub payload: AssetPayload,
}

/// Asset carried by a transaction: inline for CREATE, a reference for TRANSFER
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxAsset {
    /// Reference to an existing asset
    Reference {
        /// Asset id
        id: Hash,
    },
    /// Inline creation payload
    Inline(AssetPayload),
}
