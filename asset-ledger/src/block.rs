//! Blocks: ordered batches of transactions chained by id

use crate::canonical::CanonicalSerializer;
use crate::transaction::Transaction;
use crate::types::{Hash, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Proposed batch of transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Hash of `previous_block_id` and the ordered transaction ids
    pub id: Hash,

    /// Chain tip the block was assembled on
    pub previous_block_id: Hash,

    /// Transactions in block order (non-empty)
    pub transactions: Vec<Transaction>,

    /// Node that assembled the block
    pub proposer: PublicKey,

    /// Proposer signature over `id`
    pub signature: Signature,
}

impl Block {
    /// Compute the id from the previous block and transaction ids
    pub fn compute_id(previous_block_id: &Hash, transactions: &[Transaction]) -> Hash {
        let mut ser = CanonicalSerializer::new();
        ser.write_hash(previous_block_id);
        ser.write_len(transactions.len());
        for tx in transactions {
            ser.write_hash(&tx.id);
        }
        ser.hash()
    }

    /// Transaction ids in block order
    pub fn transaction_ids(&self) -> Vec<Hash> {
        self.transactions.iter().map(|tx| tx.id).collect()
    }

    /// True when the stored id matches the content
    pub fn id_matches(&self) -> bool {
        self.id == Self::compute_id(&self.previous_block_id, &self.transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Output;

    fn tx(amount: u64) -> Transaction {
        let key = PublicKey::from_bytes([5; 32]);
        Transaction::create(vec![key], vec![Output::new(vec![key], amount)], None, None)
    }

    #[test]
    fn test_block_id_depends_on_order_and_parent() {
        let (a, b) = (tx(1), tx(2));
        let forward = Block::compute_id(&Hash::GENESIS, &[a.clone(), b.clone()]);
        let backward = Block::compute_id(&Hash::GENESIS, &[b.clone(), a.clone()]);
        let other_parent = Block::compute_id(&Hash::from_bytes([1; 32]), &[a.clone(), b.clone()]);

        assert_ne!(forward, backward);
        assert_ne!(forward, other_parent);
        assert_eq!(forward, Block::compute_id(&Hash::GENESIS, &[a, b]));
    }
}
