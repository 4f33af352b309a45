//! Storage ports
//!
//! The core never owns a storage engine. Reads go through [`Lookup`]; every
//! write through [`Writer`] is a single conditional operation that either
//! applies completely or fails with [`Error::Conflict`](crate::Error::Conflict)
//! / [`Error::StaleVote`](crate::Error::StaleVote) without side effects.
//!
//! [`crate::memory::InMemoryStore`] is the reference adapter.

use crate::block::Block;
use crate::transaction::Transaction;
use crate::types::{Asset, Hash, Output, OutputRef, PublicKey};
use crate::vote::Vote;
use crate::Result;

/// Read side of the storage port
pub trait Lookup {
    /// Committed transaction by id
    fn get_transaction(&self, tx_id: &Hash) -> Option<Transaction>;

    /// Output of a committed transaction
    fn get_output(&self, output: &OutputRef) -> Option<Output> {
        self.get_transaction(&output.tx_id)
            .and_then(|tx| tx.outputs.get(output.index as usize).cloned())
    }

    /// Transaction that consumed `output`, if any
    fn spent_by(&self, output: &OutputRef) -> Option<Hash>;

    /// Whether `output` has been consumed
    fn is_spent(&self, output: &OutputRef) -> bool {
        self.spent_by(output).is_some()
    }

    /// Asset defined by a committed CREATE
    fn get_asset(&self, asset_id: &Hash) -> Option<Asset>;

    /// Last block `validator` voted valid ([`Hash::GENESIS`] before any vote)
    fn get_chain_head(&self, validator: &PublicKey) -> Hash;

    /// Id of the most recently committed block ([`Hash::GENESIS`] when empty)
    fn get_block_tip(&self) -> Hash;

    /// Committed block by id
    fn get_block(&self, block_id: &Hash) -> Option<Block>;

    /// Every vote recorded for `block_id`
    fn get_votes(&self, block_id: &Hash) -> Vec<Vote>;
}

/// Write side of the storage port
pub trait Writer {
    /// Append `block` if the block tip still equals `previous`.
    ///
    /// Atomically checks that none of the block's transactions is committed
    /// and none of their inputs is spent, then records the transactions, their
    /// assets and spends, and moves the tip to `block.id`. Re-committing a
    /// block that is already stored is a no-op.
    fn commit_block(&self, block: &Block, previous: &Hash) -> Result<()>;

    /// Record `vote` if its `previous_block_id` equals the validator's head.
    ///
    /// The head moves to `vote.block_id` only for valid votes. Re-writing an
    /// identical vote is a no-op; a different vote by the same validator for
    /// the same block is a conflict. Votes on a block that is not stored are
    /// rejected.
    fn commit_vote(&self, vote: &Vote) -> Result<()>;

    /// Mark `output` consumed by `spender` unless another transaction already
    /// consumed it
    fn mark_spent(&self, output: &OutputRef, spender: &Hash) -> Result<()>;
}

/// Full storage adapter
pub trait Storage: Lookup + Writer + Send + Sync {
    /// Consistent read view
    type Snapshot<'a>: Lookup
    where
        Self: 'a;

    /// Consistent read view for the duration of one validation.
    ///
    /// Writers may block while a snapshot is alive; drop it before committing.
    fn snapshot(&self) -> Self::Snapshot<'_>;
}
