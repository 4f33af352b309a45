//! Asset Ledger Core
//!
//! Data model, policy evaluator and transaction validator of an
//! asset-transfer ledger.
//!
//! # Architecture
//!
//! - **Content addressing**: transaction and block ids are SHA-256 digests of
//!   a canonical length-prefixed encoding
//! - **Closed policy language**: asset policies are parsed into an AST and
//!   interpreted, never executed
//! - **Pure validation**: [`TransactionValidator`] reads a storage snapshot and
//!   never writes
//! - **Conditional writes**: every [`storage::Writer`] call is one atomic
//!   check-and-commit
//!
//! # Invariants
//!
//! - Conservation: a TRANSFER moves exactly what it consumes unless its
//!   selected policy clause overrides the check
//! - Double-spend exclusion: at most one committed transaction spends an output
//! - Deterministic ids: same fields in the same order, same id

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod block;
pub mod canonical;
pub mod config;
pub mod crypto;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod policy;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod validation;
pub mod vote;

// Re-exports
pub use block::Block;
pub use config::{Config, PolicyConfig};
pub use crypto::{CryptoAdapter, Ed25519Crypto, KeyPair, PrivateKey};
pub use error::{Error, Result, StructuralError, ValidationError};
pub use memory::InMemoryStore;
pub use storage::{Lookup, Storage, Writer};
pub use transaction::Transaction;
pub use types::{
    Asset, AssetPayload, Clause, ConservationMode, Hash, Input, Operation, Output, OutputRef,
    Policy, PublicKey, Signature,
};
pub use validation::TransactionValidator;
pub use vote::{BlockStatus, Vote};
