//! Consensus for the asset ledger
//!
//! Turns validated transactions into signed blocks and records each
//! validator's verdict on them as a vote chain.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 ConsensusDriver                      │
//! │   submit | submit_batch | vote_on_block              │
//! └──────┬──────────────────┬───────────────────┬───────┘
//!        │ validate         │ assemble/write    │ vote/write
//!        ↓                  ↓                   ↓
//! ┌──────────────┐  ┌────────────────┐  ┌───────────────┐
//! │  Validator   │  │ BlockAssembler │  │   VoteChain   │
//! └──────┬───────┘  └───────┬────────┘  └───────┬───────┘
//!        │ snapshot         │ commit_block      │ commit_vote
//!        ↓                  ↓                   ↓
//! ┌─────────────────────────────────────────────────────┐
//! │            Storage (conditional writes)              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - A block is written only if the block tip is still its previous block
//! - A vote is written only if it extends the validator's current head
//! - Lost races are retried from a fresh snapshot a bounded number of times
//! - A block is decided `Valid` by a strict majority of the voter set

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod assembler;
pub mod config;
pub mod driver;
pub mod error;
pub mod vote_chain;

// Re-exports
pub use assembler::BlockAssembler;
pub use config::{Config, ConsensusConfig};
pub use driver::{BatchReceipt, ConsensusDriver, Receipt, TxOutcome};
pub use error::{Error, Result};
pub use vote_chain::{election_status, VoteChain};
