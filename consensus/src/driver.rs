//! Consensus driver
//!
//! Composes validation, block assembly and vote casting into the admission
//! flow of one node:
//!
//! ```text
//! submit(tx)
//!   ├─ snapshot ── duplicate check ── validate ── assemble ── check_block
//!   ├─ write_block ─(conflict)─> retry from snapshot, bounded
//!   └─ vote(true) ── write_vote ─(stale/conflict)─> re-read head, bounded
//! ```
//!
//! A transaction or block that fails validation is reported before any write.

use crate::assembler::BlockAssembler;
use crate::config::{Config, ConsensusConfig};
use crate::vote_chain::VoteChain;
use crate::{Error, Result};
use asset_ledger::metrics::Metrics;
use asset_ledger::{
    Block, CryptoAdapter, Ed25519Crypto, Hash, KeyPair, Lookup, OutputRef, PublicKey, Storage,
    StructuralError, Transaction, TransactionValidator, ValidationError, Vote,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Accepted transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    /// Transaction id
    pub tx_id: Hash,
    /// Block holding the transaction
    pub block_id: Hash,
    /// This node's vote on the block
    pub vote: Vote,
}

/// Per-transaction result of a batch or node submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxOutcome {
    /// Committed in `block_id`
    Accepted {
        /// Transaction id
        tx_id: Hash,
        /// Block holding the transaction
        block_id: Hash,
    },
    /// Not committed
    Rejected {
        /// Transaction id
        tx_id: Hash,
        /// Error label, e.g. `double_spend`
        kind: String,
        /// Error description
        reason: String,
    },
    /// Input could not be decoded as a transaction
    Malformed {
        /// Decoder message
        reason: String,
    },
}

impl TxOutcome {
    /// Rejection carrying `error`
    pub fn rejected(tx_id: Hash, error: &Error) -> Self {
        TxOutcome::Rejected {
            tx_id,
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }

    /// Whether the transaction was committed
    pub fn is_accepted(&self) -> bool {
        matches!(self, TxOutcome::Accepted { .. })
    }
}

/// Result of [`ConsensusDriver::submit_batch`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReceipt {
    /// Block holding the admitted transactions, if any were admitted
    pub block_id: Option<Hash>,
    /// This node's vote on that block
    pub vote: Option<Vote>,
    /// One outcome per submitted transaction, in submission order
    pub outcomes: Vec<TxOutcome>,
}

/// Single-node admission pipeline
#[derive(Debug)]
pub struct ConsensusDriver<S, C = Ed25519Crypto> {
    store: Arc<S>,
    validator: TransactionValidator<C>,
    assembler: BlockAssembler<S, C>,
    vote_chain: VoteChain<S, C>,
    config: ConsensusConfig,
    metrics: Metrics,
}

impl<S: Storage> ConsensusDriver<S> {
    /// Driver backed by the Ed25519 adapter
    pub fn new(store: Arc<S>, keypair: KeyPair, config: &Config) -> Result<Self> {
        Self::with_crypto(store, Ed25519Crypto, keypair, config)
    }
}

impl<S: Storage, C: CryptoAdapter + Clone> ConsensusDriver<S, C> {
    /// Driver backed by a custom crypto adapter
    pub fn with_crypto(store: Arc<S>, crypto: C, keypair: KeyPair, config: &Config) -> Result<Self> {
        let metrics =
            Metrics::new().map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;

        let validator = TransactionValidator::with_crypto(crypto.clone(), config.ledger.policy.clone())
            .with_metrics(metrics.clone());
        let assembler = BlockAssembler::new(
            store.clone(),
            crypto.clone(),
            keypair.clone(),
            config.consensus.max_block_transactions,
        )
        .with_metrics(metrics.clone());
        let vote_chain = VoteChain::new(store.clone(), crypto, keypair).with_metrics(metrics.clone());

        Ok(Self {
            store,
            validator,
            assembler,
            vote_chain,
            config: config.consensus.clone(),
            metrics,
        })
    }

    /// This node's validator id
    pub fn validator_id(&self) -> PublicKey {
        self.vote_chain.validator_id()
    }

    /// Underlying storage
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Node metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// This node's vote chain
    pub fn vote_chain(&self) -> &VoteChain<S, C> {
        &self.vote_chain
    }

    /// Admit one transaction: validate, commit it in its own block, vote valid.
    ///
    /// Validation failures are returned before anything is written. Block
    /// conflicts are retried with a fresh snapshot, so a competing spend that
    /// won the race surfaces as `DoubleSpend`.
    pub async fn submit(&self, tx: Transaction) -> Result<Receipt> {
        let tx_id = tx.id;
        let (block, ()) = self
            .commit_with_retry(|lookup| {
                self.admit(&tx, lookup)?;
                Ok((vec![tx.clone()], ()))
            })
            .await?;
        let block = block.ok_or_else(|| Error::Other(format!("no block committed for {}", tx_id)))?;

        let vote = self.cast_vote(block.id, true).await?;
        info!(tx_id = %tx_id, block_id = %block.id, "Transaction accepted");

        Ok(Receipt {
            tx_id,
            block_id: block.id,
            vote,
        })
    }

    /// Admit several transactions as one block.
    ///
    /// Each transaction is validated on the same snapshot; one that conflicts
    /// with an earlier admitted transaction of the batch is rejected. The
    /// admitted ones are committed together and voted valid.
    pub async fn submit_batch(&self, txs: Vec<Transaction>) -> Result<BatchReceipt> {
        if txs.len() > self.config.max_block_transactions {
            return Err(Error::InvalidBlock(format!(
                "{} transactions exceed the block limit of {}",
                txs.len(),
                self.config.max_block_transactions
            )));
        }

        let (block, verdicts) = self
            .commit_with_retry(|lookup| {
                let mut admitted = Vec::with_capacity(txs.len());
                let mut verdicts = Vec::with_capacity(txs.len());
                let mut seen: HashSet<Hash> = HashSet::new();
                let mut claimed: HashMap<OutputRef, Hash> = HashMap::new();

                for tx in &txs {
                    match self.admit_into_batch(tx, lookup, &seen, &claimed) {
                        Ok(()) => {
                            seen.insert(tx.id);
                            claimed.extend(tx.spent_outputs().map(|output| (*output, tx.id)));
                            admitted.push(tx.clone());
                            verdicts.push(None);
                        }
                        Err(e) => {
                            debug!(tx_id = %tx.id, error = %e, "Batch transaction rejected");
                            verdicts.push(Some(TxOutcome::rejected(tx.id, &e)));
                        }
                    }
                }
                Ok((admitted, verdicts))
            })
            .await?;

        let block_id = block.as_ref().map(|block| block.id);
        let outcomes = txs
            .iter()
            .zip(verdicts)
            .map(|(tx, verdict)| match (verdict, block_id) {
                (Some(rejection), _) => rejection,
                (None, Some(block_id)) => TxOutcome::Accepted {
                    tx_id: tx.id,
                    block_id,
                },
                // Admitted implies a block was written
                (None, None) => TxOutcome::rejected(tx.id, &Error::Other("not committed".into())),
            })
            .collect();

        let vote = match block_id {
            Some(block_id) => Some(self.cast_vote(block_id, true).await?),
            None => None,
        };

        Ok(BatchReceipt {
            block_id,
            vote,
            outcomes,
        })
    }

    /// Decode one JSON transaction and submit it.
    ///
    /// Never fails: undecodable input yields [`TxOutcome::Malformed`], any
    /// other error a [`TxOutcome::Rejected`].
    pub async fn submit_json(&self, line: &str) -> TxOutcome {
        let tx: Transaction = match serde_json::from_str(line) {
            Ok(tx) => tx,
            Err(e) => {
                warn!(error = %e, "Unparseable transaction");
                return TxOutcome::Malformed {
                    reason: e.to_string(),
                };
            }
        };

        let tx_id = tx.id;
        match self.submit(tx).await {
            Ok(receipt) => TxOutcome::Accepted {
                tx_id,
                block_id: receipt.block_id,
            },
            Err(e) => {
                warn!(tx_id = %tx_id, kind = e.kind(), error = %e, "Transaction rejected");
                TxOutcome::rejected(tx_id, &e)
            }
        }
    }

    /// Re-check a stored block and record this validator's verdict on it
    pub async fn vote_on_block(&self, block_id: Hash) -> Result<Vote> {
        let is_valid = {
            let snapshot = self.store.snapshot();
            let lookup: &dyn Lookup = &snapshot;
            let block = lookup
                .get_block(&block_id)
                .ok_or(Error::UnknownBlock(block_id))?;
            self.judge(&block, lookup)
        };
        self.cast_vote(block_id, is_valid).await
    }

    fn judge(&self, block: &Block, lookup: &dyn Lookup) -> bool {
        if let Err(e) = self.assembler.check_block(block, lookup) {
            warn!(block_id = %block.id, error = %e, "Block is malformed");
            return false;
        }
        for tx in &block.transactions {
            if let Err(e) = self.validator.validate(tx, lookup) {
                warn!(block_id = %block.id, tx_id = %tx.id, error = %e, "Block holds an invalid transaction");
                return false;
            }
        }
        true
    }

    fn admit(&self, tx: &Transaction, lookup: &dyn Lookup) -> Result<()> {
        if lookup.get_transaction(&tx.id).is_some() {
            return Err(ValidationError::from(StructuralError::AlreadyCommitted { tx_id: tx.id }).into());
        }
        self.validator.validate(tx, lookup)?;
        Ok(())
    }

    fn admit_into_batch(
        &self,
        tx: &Transaction,
        lookup: &dyn Lookup,
        seen: &HashSet<Hash>,
        claimed: &HashMap<OutputRef, Hash>,
    ) -> Result<()> {
        if seen.contains(&tx.id) {
            return Err(Error::InvalidBlock(format!(
                "transaction {} appears twice in batch",
                tx.id
            )));
        }
        self.admit(tx, lookup)?;
        for output in tx.spent_outputs() {
            if let Some(first) = claimed.get(output) {
                return Err(ValidationError::DoubleSpend {
                    output: *output,
                    spent_by: *first,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Select transactions on a fresh snapshot, assemble, check and write,
    /// retrying the whole round on a commit conflict.
    async fn commit_with_retry<T, F>(&self, mut select: F) -> Result<(Option<Block>, T)>
    where
        F: FnMut(&dyn Lookup) -> Result<(Vec<Transaction>, T)>,
    {
        let max_attempts = self.config.max_commit_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            // The snapshot's read guard must be gone before the write
            let (block, extra) = {
                let snapshot = self.store.snapshot();
                let lookup: &dyn Lookup = &snapshot;
                let (transactions, extra) = select(lookup)?;
                if transactions.is_empty() {
                    return Ok((None, extra));
                }
                let block = self.assembler.assemble(transactions, lookup.get_block_tip())?;
                self.assembler.check_block(&block, lookup)?;
                (block, extra)
            };

            match self.assembler.write_block(&block) {
                Ok(()) => return Ok((Some(block), extra)),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, block_id = %block.id, error = %e, "Block commit conflict, retrying");
                    self.metrics.record_conflict();
                    self.backoff(attempt).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        self.metrics.record_conflict();
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn cast_vote(&self, block_id: Hash, is_valid: bool) -> Result<Vote> {
        let max_attempts = self.config.max_commit_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            // A vote already recorded for this block (earlier attempt) stands
            if let Some(existing) = self.vote_chain.existing_vote(&block_id) {
                return Ok(existing);
            }

            let previous = self.vote_chain.get_last_voted_block();
            let vote = self.vote_chain.vote(block_id, previous, is_valid);
            match self.vote_chain.write_vote(&vote) {
                Ok(()) => return Ok(vote),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, block_id = %block_id, error = %e, "Vote write failed, retrying");
                    self.metrics.record_conflict();
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
