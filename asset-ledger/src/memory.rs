//! In-memory storage adapter
//!
//! All state sits behind one `parking_lot::RwLock`. Each [`Writer`] call takes
//! the write guard once, so its check and its update are atomic with respect
//! to every other writer and to open snapshots.

use crate::block::Block;
use crate::storage::{Lookup, Storage, Writer};
use crate::transaction::Transaction;
use crate::types::{Asset, Hash, OutputRef, PublicKey, TxAsset};
use crate::vote::Vote;
use crate::{Error, Result};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    transactions: HashMap<Hash, Transaction>,
    spent: HashMap<OutputRef, Hash>,
    assets: HashMap<Hash, Asset>,
    blocks: HashMap<Hash, Block>,
    block_order: Vec<Hash>,
    heads: HashMap<PublicKey, Hash>,
    votes: HashMap<Hash, Vec<Vote>>,
}

impl State {
    fn tip(&self) -> Hash {
        self.block_order.last().copied().unwrap_or(Hash::GENESIS)
    }
}

impl Lookup for State {
    fn get_transaction(&self, tx_id: &Hash) -> Option<Transaction> {
        self.transactions.get(tx_id).cloned()
    }

    fn spent_by(&self, output: &OutputRef) -> Option<Hash> {
        self.spent.get(output).copied()
    }

    fn get_asset(&self, asset_id: &Hash) -> Option<Asset> {
        self.assets.get(asset_id).cloned()
    }

    fn get_chain_head(&self, validator: &PublicKey) -> Hash {
        self.heads.get(validator).copied().unwrap_or(Hash::GENESIS)
    }

    fn get_block_tip(&self) -> Hash {
        self.tip()
    }

    fn get_block(&self, block_id: &Hash) -> Option<Block> {
        self.blocks.get(block_id).cloned()
    }

    fn get_votes(&self, block_id: &Hash) -> Vec<Vote> {
        self.votes.get(block_id).cloned().unwrap_or_default()
    }
}

/// Reference storage adapter
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed block ids, oldest first
    pub fn block_ids(&self) -> Vec<Hash> {
        self.state.read().block_order.clone()
    }

    /// Number of committed transactions
    pub fn transaction_count(&self) -> usize {
        self.state.read().transactions.len()
    }
}

/// Read view holding the store's read guard
#[derive(Debug)]
pub struct MemorySnapshot<'a> {
    state: RwLockReadGuard<'a, State>,
}

impl Lookup for MemorySnapshot<'_> {
    fn get_transaction(&self, tx_id: &Hash) -> Option<Transaction> {
        self.state.get_transaction(tx_id)
    }

    fn spent_by(&self, output: &OutputRef) -> Option<Hash> {
        self.state.spent_by(output)
    }

    fn get_asset(&self, asset_id: &Hash) -> Option<Asset> {
        self.state.get_asset(asset_id)
    }

    fn get_chain_head(&self, validator: &PublicKey) -> Hash {
        self.state.get_chain_head(validator)
    }

    fn get_block_tip(&self) -> Hash {
        self.state.get_block_tip()
    }

    fn get_block(&self, block_id: &Hash) -> Option<Block> {
        self.state.get_block(block_id)
    }

    fn get_votes(&self, block_id: &Hash) -> Vec<Vote> {
        self.state.get_votes(block_id)
    }
}

impl Lookup for InMemoryStore {
    fn get_transaction(&self, tx_id: &Hash) -> Option<Transaction> {
        self.state.read().get_transaction(tx_id)
    }

    fn spent_by(&self, output: &OutputRef) -> Option<Hash> {
        self.state.read().spent_by(output)
    }

    fn get_asset(&self, asset_id: &Hash) -> Option<Asset> {
        self.state.read().get_asset(asset_id)
    }

    fn get_chain_head(&self, validator: &PublicKey) -> Hash {
        self.state.read().get_chain_head(validator)
    }

    fn get_block_tip(&self) -> Hash {
        self.state.read().tip()
    }

    fn get_block(&self, block_id: &Hash) -> Option<Block> {
        self.state.read().get_block(block_id)
    }

    fn get_votes(&self, block_id: &Hash) -> Vec<Vote> {
        self.state.read().get_votes(block_id)
    }
}

impl Writer for InMemoryStore {
    fn commit_block(&self, block: &Block, previous: &Hash) -> Result<()> {
        let mut state = self.state.write();

        if state.blocks.contains_key(&block.id) {
            debug!(block_id = %block.id, "Block already committed");
            return Ok(());
        }

        let tip = state.tip();
        if tip != *previous || block.previous_block_id != *previous {
            return Err(Error::Conflict(format!(
                "block tip is {}, block {} expects {}",
                tip, block.id, block.previous_block_id
            )));
        }

        let mut spends: HashMap<OutputRef, Hash> = HashMap::new();
        for tx in &block.transactions {
            if state.transactions.contains_key(&tx.id) {
                return Err(Error::Conflict(format!("transaction {} already committed", tx.id)));
            }
            for output in tx.spent_outputs() {
                if let Some(spender) = state.spent.get(output) {
                    return Err(Error::Conflict(format!(
                        "output {} already spent by {}",
                        output, spender
                    )));
                }
                if spends.insert(*output, tx.id).is_some() {
                    return Err(Error::Conflict(format!(
                        "output {} spent twice in block {}",
                        output, block.id
                    )));
                }
            }
        }

        // All checks passed; apply
        state.spent.extend(spends);
        for tx in &block.transactions {
            if let TxAsset::Inline(payload) = &tx.asset {
                state.assets.insert(
                    tx.id,
                    Asset {
                        id: tx.id,
                        payload: payload.clone(),
                    },
                );
            }
            state.transactions.insert(tx.id, tx.clone());
        }
        state.blocks.insert(block.id, block.clone());
        state.block_order.push(block.id);

        Ok(())
    }

    fn commit_vote(&self, vote: &Vote) -> Result<()> {
        let mut state = self.state.write();

        let existing = state
            .votes
            .get(&vote.block_id)
            .and_then(|votes| votes.iter().find(|v| v.validator_id == vote.validator_id));
        if let Some(existing) = existing {
            return if existing == vote {
                Ok(())
            } else {
                Err(Error::Conflict(format!(
                    "validator {} already voted on block {}",
                    vote.validator_id, vote.block_id
                )))
            };
        }

        if !state.blocks.contains_key(&vote.block_id) {
            return Err(Error::Storage(format!(
                "vote by {} references unknown block {}",
                vote.validator_id, vote.block_id
            )));
        }

        let head = state.get_chain_head(&vote.validator_id);
        if vote.previous_block_id != head {
            return Err(Error::StaleVote {
                expected: head,
                actual: vote.previous_block_id,
            });
        }

        state.votes.entry(vote.block_id).or_default().push(vote.clone());
        if vote.is_valid {
            state.heads.insert(vote.validator_id, vote.block_id);
        }

        Ok(())
    }

    fn mark_spent(&self, output: &OutputRef, spender: &Hash) -> Result<()> {
        let mut state = self.state.write();
        match state.spent.get(output) {
            Some(existing) if existing == spender => Ok(()),
            Some(existing) => Err(Error::Conflict(format!(
                "output {} already spent by {}",
                output, existing
            ))),
            None => {
                state.spent.insert(*output, *spender);
                Ok(())
            }
        }
    }
}

impl Storage for InMemoryStore {
    type Snapshot<'a> = MemorySnapshot<'a>;

    fn snapshot(&self) -> Self::Snapshot<'_> {
        MemorySnapshot {
            state: self.state.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetPayload, Output, Signature};
    use chrono::Utc;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    fn create_tx(amount: u64) -> Transaction {
        Transaction::create(
            vec![key(1)],
            vec![Output::new(vec![key(1)], amount)],
            Some(AssetPayload::new("widget", serde_json::json!({ "serial": amount }))),
            None,
        )
    }

    fn block(previous: Hash, transactions: Vec<Transaction>) -> Block {
        Block {
            id: Block::compute_id(&previous, &transactions),
            previous_block_id: previous,
            transactions,
            proposer: key(9),
            signature: Signature::from_bytes([0; 64]),
        }
    }

    /// Commit `count` chained single-transaction blocks, returning their ids
    fn committed_blocks(store: &InMemoryStore, count: u64) -> Vec<Hash> {
        let mut previous = Hash::GENESIS;
        (1..=count)
            .map(|amount| {
                let b = block(previous, vec![create_tx(amount)]);
                store.commit_block(&b, &previous).unwrap();
                previous = b.id;
                b.id
            })
            .collect()
    }

    fn vote(block_id: Hash, previous: Hash, is_valid: bool) -> Vote {
        Vote {
            validator_id: key(7),
            block_id,
            previous_block_id: previous,
            is_valid,
            timestamp: Utc::now(),
            signature: Signature::from_bytes([0; 64]),
        }
    }

    #[test]
    fn test_commit_block_records_everything() {
        let store = InMemoryStore::new();
        let tx = create_tx(5);
        let b = block(Hash::GENESIS, vec![tx.clone()]);

        store.commit_block(&b, &Hash::GENESIS).unwrap();

        assert_eq!(store.get_block_tip(), b.id);
        assert_eq!(store.get_transaction(&tx.id), Some(tx.clone()));
        assert_eq!(store.get_asset(&tx.id).unwrap().payload.kind.as_deref(), Some("widget"));
        assert_eq!(store.get_output(&OutputRef::new(tx.id, 0)).unwrap().amount, 5);
        assert!(store.get_output(&OutputRef::new(tx.id, 1)).is_none());
        assert_eq!(store.block_ids(), vec![b.id]);
    }

    #[test]
    fn test_commit_block_is_idempotent() {
        let store = InMemoryStore::new();
        let b = block(Hash::GENESIS, vec![create_tx(1)]);

        store.commit_block(&b, &Hash::GENESIS).unwrap();
        store.commit_block(&b, &Hash::GENESIS).unwrap();

        assert_eq!(store.block_ids().len(), 1);
        assert_eq!(store.transaction_count(), 1);
    }

    #[test]
    fn test_commit_block_conflicts_when_tip_moved() {
        let store = InMemoryStore::new();
        let first = block(Hash::GENESIS, vec![create_tx(1)]);
        let second = block(Hash::GENESIS, vec![create_tx(2)]);

        store.commit_block(&first, &Hash::GENESIS).unwrap();
        let err = store.commit_block(&second, &Hash::GENESIS).unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(store.get_block_tip(), first.id);
        assert!(store.get_transaction(&second.transactions[0].id).is_none());
    }

    #[test]
    fn test_commit_block_rejects_spent_input_atomically() {
        let store = InMemoryStore::new();
        let origin = create_tx(3);
        let genesis = block(Hash::GENESIS, vec![origin.clone()]);
        store.commit_block(&genesis, &Hash::GENESIS).unwrap();

        let spend = |amount| {
            Transaction::transfer(
                origin.to_inputs(),
                vec![Output::new(vec![key(2)], amount)],
                origin.id,
                None,
            )
        };
        let first = block(genesis.id, vec![spend(3)]);
        store.commit_block(&first, &genesis.id).unwrap();

        let second = block(first.id, vec![create_tx(8), spend(2)]);
        assert!(matches!(
            store.commit_block(&second, &first.id),
            Err(Error::Conflict(_))
        ));
        // Nothing from the rejected block is visible
        assert!(store.get_transaction(&second.transactions[0].id).is_none());
        assert_eq!(store.get_block_tip(), first.id);
    }

    #[test]
    fn test_vote_head_advances_only_on_valid_votes() {
        let store = InMemoryStore::new();
        let blocks = committed_blocks(&store, 2);
        let (a, b) = (blocks[0], blocks[1]);

        assert!(store.get_chain_head(&key(7)).is_genesis());

        store.commit_vote(&vote(a, Hash::GENESIS, false)).unwrap();
        assert!(store.get_chain_head(&key(7)).is_genesis());

        store.commit_vote(&vote(b, Hash::GENESIS, true)).unwrap();
        assert_eq!(store.get_chain_head(&key(7)), b);
        assert_eq!(store.get_votes(&b).len(), 1);
    }

    #[test]
    fn test_stale_vote_rejected() {
        let store = InMemoryStore::new();
        let blocks = committed_blocks(&store, 2);
        let (a, b) = (blocks[0], blocks[1]);

        store.commit_vote(&vote(a, Hash::GENESIS, true)).unwrap();
        let err = store.commit_vote(&vote(b, Hash::GENESIS, true)).unwrap_err();

        match err {
            Error::StaleVote { expected, actual } => {
                assert_eq!(expected, a);
                assert!(actual.is_genesis());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_identical_vote_is_noop_and_different_vote_conflicts() {
        let store = InMemoryStore::new();
        let a = committed_blocks(&store, 1)[0];
        let first = vote(a, Hash::GENESIS, true);

        store.commit_vote(&first).unwrap();
        store.commit_vote(&first).unwrap();
        assert_eq!(store.get_votes(&a).len(), 1);

        let flipped = Vote {
            is_valid: false,
            ..first
        };
        assert!(matches!(store.commit_vote(&flipped), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_vote_for_unknown_block_rejected() {
        let store = InMemoryStore::new();
        let known = committed_blocks(&store, 1)[0];
        let unknown = Hash::from_bytes([1; 32]);

        let err = store.commit_vote(&vote(unknown, Hash::GENESIS, true)).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!err.is_retryable());
        assert!(store.get_chain_head(&key(7)).is_genesis());
        assert!(store.get_votes(&unknown).is_empty());

        store.commit_vote(&vote(known, Hash::GENESIS, true)).unwrap();
        assert_eq!(store.get_chain_head(&key(7)), known);
    }

    #[test]
    fn test_mark_spent_is_conditional() {
        let store = InMemoryStore::new();
        let output = OutputRef::new(Hash::from_bytes([3; 32]), 0);
        let (x, y) = (Hash::from_bytes([4; 32]), Hash::from_bytes([5; 32]));

        store.mark_spent(&output, &x).unwrap();
        store.mark_spent(&output, &x).unwrap();
        assert!(matches!(store.mark_spent(&output, &y), Err(Error::Conflict(_))));
        assert_eq!(store.spent_by(&output), Some(x));
        assert!(store.is_spent(&output));
    }

    #[test]
    fn test_snapshot_reads_consistent_state() {
        let store = InMemoryStore::new();
        let b = block(Hash::GENESIS, vec![create_tx(4)]);
        store.commit_block(&b, &Hash::GENESIS).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get_block_tip(), b.id);
        assert_eq!(snapshot.get_block(&b.id), Some(b.clone()));
    }
}
