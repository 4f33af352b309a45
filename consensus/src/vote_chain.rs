//! Per-validator vote chain
//!
//! Each validator's accepted votes form a singly linked chain: a new vote's
//! `previous_block_id` must equal the block the validator last voted valid
//! (genesis before its first vote). The head moves only on valid votes.

use crate::{Error, Result};
use asset_ledger::metrics::Metrics;
use asset_ledger::types::{Condition, Fulfillment, KeySignature};
use asset_ledger::{
    BlockStatus, CryptoAdapter, Ed25519Crypto, Hash, KeyPair, Lookup, PublicKey, Storage, Vote,
    Writer,
};
use chrono::{SubsecRound, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Signs, verifies and records one validator's votes
#[derive(Debug)]
pub struct VoteChain<S, C = Ed25519Crypto> {
    store: Arc<S>,
    crypto: C,
    keypair: KeyPair,
    metrics: Option<Metrics>,
}

impl<S: Storage, C: CryptoAdapter> VoteChain<S, C> {
    /// Create new vote chain for the validator holding `keypair`
    pub fn new(store: Arc<S>, crypto: C, keypair: KeyPair) -> Self {
        Self {
            store,
            crypto,
            keypair,
            metrics: None,
        }
    }

    /// Count written votes in `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// This validator's id
    pub fn validator_id(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Build and sign a vote. Nothing is persisted.
    pub fn vote(&self, block_id: Hash, previous_block_id: Hash, is_valid: bool) -> Vote {
        let validator_id = self.validator_id();
        // Signed payload carries millisecond precision
        let timestamp = Utc::now().trunc_subsecs(3);
        let payload =
            Vote::signing_payload(&validator_id, &block_id, &previous_block_id, is_valid, &timestamp);
        let signed = self.crypto.sign(&payload, self.keypair.private_key());

        Vote {
            validator_id,
            block_id,
            previous_block_id,
            is_valid,
            timestamp,
            signature: signed.signature,
        }
    }

    /// Verify and record `vote`.
    ///
    /// Fails with `StaleVote` when `previous_block_id` is not the validator's
    /// current head, and with a conflict when the validator already cast a
    /// different vote on the same block.
    pub fn write_vote(&self, vote: &Vote) -> Result<()> {
        if !self.verify(vote) {
            return Err(Error::InvalidVote(format!(
                "signature by {} on block {} does not verify",
                vote.validator_id, vote.block_id
            )));
        }

        self.store.commit_vote(vote)?;

        info!(
            validator = %vote.validator_id,
            block_id = %vote.block_id,
            previous = %vote.previous_block_id,
            is_valid = vote.is_valid,
            "Vote recorded"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_vote(vote.is_valid);
        }
        Ok(())
    }

    /// Vote signature check
    pub fn verify(&self, vote: &Vote) -> bool {
        let condition = Condition::single(vote.validator_id);
        let fulfillment = Fulfillment {
            signatures: vec![KeySignature {
                public_key: vote.validator_id,
                signature: vote.signature,
            }],
        };
        self.crypto.verify(&condition, &fulfillment, &vote.payload())
    }

    /// Block this validator last voted valid (genesis before any vote)
    pub fn get_last_voted_block(&self) -> Hash {
        self.store.get_chain_head(&self.validator_id())
    }

    /// This validator's recorded vote on `block_id`
    pub fn existing_vote(&self, block_id: &Hash) -> Option<Vote> {
        let validator_id = self.validator_id();
        self.store
            .get_votes(block_id)
            .into_iter()
            .find(|vote| vote.validator_id == validator_id)
    }

    /// Tally recorded votes on `block_id` among `voters`
    pub fn election_status(&self, block_id: &Hash, voters: &[PublicKey]) -> BlockStatus {
        let votes: Vec<Vote> = self
            .store
            .get_votes(block_id)
            .into_iter()
            .filter(|vote| self.verify(vote))
            .collect();
        election_status(&votes, voters)
    }
}

/// Decide a block from its votes.
///
/// `Valid` once more than half of `voters` voted valid, `Invalid` once at
/// least half voted invalid, `Undecided` otherwise. Votes from outside
/// `voters` and repeat votes by one validator are ignored.
pub fn election_status(votes: &[Vote], voters: &[PublicKey]) -> BlockStatus {
    let members: HashSet<&PublicKey> = voters.iter().collect();
    let mut counted: HashSet<&PublicKey> = HashSet::new();
    let (mut valid, mut invalid) = (0usize, 0usize);

    for vote in votes {
        if !members.contains(&vote.validator_id) || !counted.insert(&vote.validator_id) {
            continue;
        }
        if vote.is_valid {
            valid += 1;
        } else {
            invalid += 1;
        }
    }

    let n = members.len();
    if n == 0 {
        return BlockStatus::Undecided;
    }
    if valid > n / 2 {
        BlockStatus::Valid
    } else if invalid >= (n + 1) / 2 {
        BlockStatus::Invalid
    } else {
        BlockStatus::Undecided
    }
}
