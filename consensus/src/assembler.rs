//! Block assembly
//!
//! Batches already-validated transactions into a signed block on top of the
//! current block tip, checks block well-formedness, and commits through the
//! storage writer's conditional `commit_block`.

use crate::{Error, Result};
use asset_ledger::metrics::Metrics;
use asset_ledger::types::{Condition, Fulfillment, KeySignature};
use asset_ledger::{
    Block, CryptoAdapter, Ed25519Crypto, Hash, KeyPair, Lookup, Storage, Transaction,
    ValidationError, Writer,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Assembles, checks and writes blocks
#[derive(Debug)]
pub struct BlockAssembler<S, C = Ed25519Crypto> {
    store: Arc<S>,
    crypto: C,
    keypair: KeyPair,
    max_block_transactions: usize,
    metrics: Option<Metrics>,
}

impl<S: Storage, C: CryptoAdapter> BlockAssembler<S, C> {
    /// Create new assembler signing with `keypair`
    pub fn new(store: Arc<S>, crypto: C, keypair: KeyPair, max_block_transactions: usize) -> Self {
        Self {
            store,
            crypto,
            keypair,
            max_block_transactions,
            metrics: None,
        }
    }

    /// Count written blocks in `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build a block on the current block tip.
    ///
    /// Transactions are not re-validated.
    pub fn create_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        let previous = self.store.get_block_tip();
        self.assemble(transactions, previous)
    }

    /// Build a block on an explicit `previous` block id
    pub fn assemble(&self, transactions: Vec<Transaction>, previous: Hash) -> Result<Block> {
        if transactions.is_empty() {
            return Err(Error::InvalidBlock("block has no transactions".to_string()));
        }
        if transactions.len() > self.max_block_transactions {
            return Err(Error::InvalidBlock(format!(
                "{} transactions exceed the block limit of {}",
                transactions.len(),
                self.max_block_transactions
            )));
        }

        let id = Block::compute_id(&previous, &transactions);
        let signed = self.crypto.sign(id.as_bytes(), self.keypair.private_key());

        debug!(block_id = %id, previous = %previous, txs = transactions.len(), "Block assembled");

        Ok(Block {
            id,
            previous_block_id: previous,
            transactions,
            proposer: signed.public_key,
            signature: signed.signature,
        })
    }

    /// Commit `block` if the block tip is still its `previous_block_id`.
    ///
    /// Fails with a retryable conflict when the tip moved. Writing a block
    /// that is already stored succeeds without changes.
    pub fn write_block(&self, block: &Block) -> Result<()> {
        self.store.commit_block(block, &block.previous_block_id)?;

        info!(
            block_id = %block.id,
            previous = %block.previous_block_id,
            txs = block.transactions.len(),
            "Block committed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_block_written();
        }
        Ok(())
    }

    /// Well-formedness of `block`, independent of transaction validity.
    ///
    /// The block must be non-empty, its id must match its content, the
    /// proposer signature must verify, `previous_block_id` must be genesis or
    /// a stored block, and no two transactions may share an id or spend the
    /// same output.
    pub fn check_block<L: Lookup + ?Sized>(&self, block: &Block, lookup: &L) -> Result<()> {
        if block.transactions.is_empty() {
            return Err(Error::InvalidBlock(format!("block {} is empty", block.id)));
        }
        if !block.id_matches() {
            return Err(Error::InvalidBlock(format!(
                "block {} does not match its content",
                block.id
            )));
        }

        let condition = Condition::single(block.proposer);
        let fulfillment = Fulfillment {
            signatures: vec![KeySignature {
                public_key: block.proposer,
                signature: block.signature,
            }],
        };
        if !self.crypto.verify(&condition, &fulfillment, block.id.as_bytes()) {
            return Err(Error::InvalidBlock(format!(
                "proposer signature on block {} does not verify",
                block.id
            )));
        }

        let previous = &block.previous_block_id;
        if !previous.is_genesis() && lookup.get_block(previous).is_none() {
            return Err(Error::InvalidBlock(format!(
                "block {} references unknown previous block {}",
                block.id, previous
            )));
        }

        let mut ids = HashSet::with_capacity(block.transactions.len());
        let mut spends = HashMap::new();
        for tx in &block.transactions {
            if !ids.insert(tx.id) {
                return Err(Error::InvalidBlock(format!(
                    "transaction {} appears twice in block {}",
                    tx.id, block.id
                )));
            }
            for output in tx.spent_outputs() {
                if let Some(first) = spends.insert(*output, tx.id) {
                    return Err(ValidationError::DoubleSpend {
                        output: *output,
                        spent_by: first,
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_ledger::types::Output;
    use asset_ledger::InMemoryStore;

    fn assembler(store: &Arc<InMemoryStore>) -> BlockAssembler<InMemoryStore> {
        BlockAssembler::new(store.clone(), Ed25519Crypto, KeyPair::from_seed(&[3; 32]), 4)
    }

    fn tx(amount: u64) -> Transaction {
        let owner = KeyPair::from_seed(&[amount as u8; 32]).public_key();
        Transaction::create(vec![owner], vec![Output::new(vec![owner], amount)], None, None)
    }

    #[test]
    fn test_create_block_on_tip() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = assembler(&store);

        let first = assembler.create_block(vec![tx(1)]).unwrap();
        assert!(first.previous_block_id.is_genesis());
        assembler.check_block(&first, store.as_ref()).unwrap();
        assembler.write_block(&first).unwrap();

        let second = assembler.create_block(vec![tx(2), tx(3)]).unwrap();
        assert_eq!(second.previous_block_id, first.id);
        assembler.check_block(&second, store.as_ref()).unwrap();
        assembler.write_block(&second).unwrap();

        assert_eq!(store.block_ids(), vec![first.id, second.id]);
    }

    #[test]
    fn test_block_limits() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = assembler(&store);

        assert!(matches!(assembler.create_block(vec![]), Err(Error::InvalidBlock(_))));
        let too_many = (1..=5).map(tx).collect();
        assert!(matches!(assembler.create_block(too_many), Err(Error::InvalidBlock(_))));
    }

    #[test]
    fn test_reassembly_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = assembler(&store);

        let block = assembler.create_block(vec![tx(1)]).unwrap();
        let again = assembler.create_block(vec![tx(1)]).unwrap();
        assert_eq!(block, again);

        assembler.write_block(&block).unwrap();
        assembler.write_block(&again).unwrap();
        assert_eq!(store.block_ids().len(), 1);
    }

    #[test]
    fn test_write_block_conflicts_when_tip_moved() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = assembler(&store);

        let stale = assembler.create_block(vec![tx(1)]).unwrap();
        let winner = assembler.create_block(vec![tx(2)]).unwrap();
        assembler.write_block(&winner).unwrap();

        let err = assembler.write_block(&stale).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_check_block_rejects_tampering() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = assembler(&store);

        let mut forged = assembler.create_block(vec![tx(1)]).unwrap();
        forged.proposer = KeyPair::from_seed(&[4; 32]).public_key();
        assert!(matches!(
            assembler.check_block(&forged, store.as_ref()),
            Err(Error::InvalidBlock(_))
        ));

        let mut reordered = assembler.create_block(vec![tx(1), tx(2)]).unwrap();
        reordered.transactions.swap(0, 1);
        assert!(matches!(
            assembler.check_block(&reordered, store.as_ref()),
            Err(Error::InvalidBlock(_))
        ));

        let orphan = assembler
            .assemble(vec![tx(1)], Hash::from_bytes([9; 32]))
            .unwrap();
        assert!(matches!(
            assembler.check_block(&orphan, store.as_ref()),
            Err(Error::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_check_block_detects_intra_block_double_spend() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = assembler(&store);
        let origin = tx(7);

        let spend = |amount| {
            Transaction::transfer(
                origin.to_inputs(),
                vec![Output::new(vec![KeyPair::from_seed(&[8; 32]).public_key()], amount)],
                origin.id,
                None,
            )
        };
        let (a, b) = (spend(7), spend(6));
        let block = assembler.create_block(vec![a.clone(), b]).unwrap();

        let err = assembler.check_block(&block, store.as_ref()).unwrap_err();
        match err.validation_error() {
            Some(ValidationError::DoubleSpend { spent_by, .. }) => assert_eq!(*spent_by, a.id),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
