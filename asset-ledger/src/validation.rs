//! Transaction validation
//!
//! [`TransactionValidator::validate`] is the single gate a transaction must
//! pass before it may be included in a block. Checks run in a fixed order and
//! stop at the first failure:
//!
//! 1. **Structural** - id integrity, non-empty inputs/outputs, positive
//!    amounts, sane thresholds, operation-specific input shape, resolvable
//!    outputs and asset
//! 2. **Unspent** - no referenced output consumed by another transaction
//! 3. **Fulfillment** - every input satisfies the condition it unlocks
//! 4. **Conservation** - TRANSFER moves exactly what it consumes, unless the
//!    selected policy clause overrides the check
//! 5. **Policy** - the selected clause's rule holds, and every other lineage
//!    consumed by a TRANSFER has a clause of its own policy selecting the
//!    transaction whose rule holds as well
//!
//! Validation never writes. Callers record acceptance through
//! [`crate::storage::Writer`], whose conditional commits close the gap between
//! this check and the write.

use crate::config::PolicyConfig;
use crate::crypto::{CryptoAdapter, Ed25519Crypto};
use crate::error::{StructuralError, ValidationError};
use crate::metrics::Metrics;
use crate::policy::{self, CompiledPolicy, PolicyError};
use crate::storage::Lookup;
use crate::transaction::Transaction;
use crate::types::{Condition, Hash, Operation, Output, Policy, TxAsset};
use std::collections::HashSet;
use std::time::Instant;
use tracing::debug;

/// Output consumed by a TRANSFER input, with the lineage it belongs to
struct Consumed {
    output: Output,
    asset_id: Hash,
}

/// Everything step 1 resolves for the later steps
struct Resolved {
    conditions: Vec<Condition>,
    consumed: Vec<Consumed>,
    policy: Option<Policy>,
}

type CheckResult<T> = std::result::Result<T, ValidationError>;

/// Validates transactions against a storage snapshot
#[derive(Debug, Clone)]
pub struct TransactionValidator<C = Ed25519Crypto> {
    crypto: C,
    limits: PolicyConfig,
    metrics: Option<Metrics>,
}

impl TransactionValidator<Ed25519Crypto> {
    /// Validator backed by the Ed25519 adapter
    pub fn new(limits: PolicyConfig) -> Self {
        Self::with_crypto(Ed25519Crypto, limits)
    }
}

impl<C: CryptoAdapter> TransactionValidator<C> {
    /// Validator backed by a custom crypto adapter
    pub fn with_crypto(crypto: C, limits: PolicyConfig) -> Self {
        Self {
            crypto,
            limits,
            metrics: None,
        }
    }

    /// Record outcomes and latency in `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Crypto adapter in use
    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    /// Decide whether `tx` is admissible given the state visible in `lookup`.
    ///
    /// `lookup` should be a consistent snapshot for the duration of the call.
    pub fn validate<L: Lookup + ?Sized>(&self, tx: &Transaction, lookup: &L) -> CheckResult<()> {
        let start = Instant::now();
        let result = self.check(tx, lookup);
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(()) => {
                debug!(tx_id = %tx.id, operation = %tx.operation, "Transaction valid");
                if let Some(metrics) = &self.metrics {
                    metrics.record_validated(elapsed);
                }
            }
            Err(e) => {
                debug!(tx_id = %tx.id, operation = %tx.operation, kind = e.kind(), error = %e, "Transaction rejected");
                if let Some(metrics) = &self.metrics {
                    metrics.record_rejected(e.kind(), elapsed);
                }
            }
        }

        result
    }

    fn check<L: Lookup + ?Sized>(&self, tx: &Transaction, lookup: &L) -> CheckResult<()> {
        check_shape(tx)?;
        let resolved = match tx.operation {
            Operation::Create => resolve_create(tx)?,
            Operation::Transfer => resolve_transfer(tx, lookup)?,
        };
        let compiled = match &resolved.policy {
            Some(policy) => Some(compile(policy, &self.limits)?),
            None => None,
        };

        // Unspent
        for output in tx.spent_outputs() {
            if let Some(spender) = lookup.spent_by(output) {
                if spender != tx.id {
                    return Err(ValidationError::DoubleSpend {
                        output: *output,
                        spent_by: spender,
                    });
                }
            }
        }

        // Fulfillment
        let payload = tx.signing_payload();
        for (input_index, (input, condition)) in
            tx.inputs.iter().zip(&resolved.conditions).enumerate()
        {
            let verified = input
                .fulfillment
                .as_ref()
                .map_or(false, |f| self.crypto.verify(condition, f, &payload));
            if !verified {
                return Err(ValidationError::InvalidSignature { input_index });
            }
        }

        let clause = compiled
            .as_ref()
            .and_then(|policy| policy::select_clause(policy, tx));

        // Conservation
        if tx.operation == Operation::Transfer {
            let asset_id = tx.asset_id();
            if clause.is_none() {
                if let Some((index, foreign)) = resolved
                    .consumed
                    .iter()
                    .enumerate()
                    .find(|(_, c)| c.asset_id != asset_id)
                {
                    return Err(StructuralError::MixedAssets {
                        index,
                        expected: asset_id,
                        found: foreign.asset_id,
                    }
                    .into());
                }
            }

            if !clause.map_or(false, |c| c.overrides_conservation()) {
                let inputs: u128 = resolved.consumed.iter().map(|c| c.output.amount as u128).sum();
                let outputs = tx.output_total();
                if inputs != outputs {
                    return Err(StructuralError::AmountMismatch { inputs, outputs }.into());
                }
            }
        }

        // Policy
        if let Some(clause) = clause {
            if !policy::evaluate_rule(clause, tx) {
                return Err(ValidationError::PolicyViolation {
                    clause_index: clause.index,
                    condition: clause.source.condition.clone(),
                    rule: clause.source.rule.clone(),
                });
            }
        }

        self.check_foreign_lineages(tx, &resolved, lookup)
    }

    /// Outputs of another lineage stay bound by that lineage's policy: one of
    /// its clauses must select `tx` and that clause's rule must hold.
    fn check_foreign_lineages<L: Lookup + ?Sized>(
        &self,
        tx: &Transaction,
        resolved: &Resolved,
        lookup: &L,
    ) -> CheckResult<()> {
        let asset_id = tx.asset_id();
        let mut checked = HashSet::new();

        for (index, consumed) in resolved.consumed.iter().enumerate() {
            if consumed.asset_id == asset_id || !checked.insert(consumed.asset_id) {
                continue;
            }
            let foreign = lookup
                .get_asset(&consumed.asset_id)
                .ok_or(StructuralError::UnknownAsset {
                    asset_id: consumed.asset_id,
                })?;
            let policy = match foreign.payload.policy {
                Some(policy) if !policy.is_empty() => policy,
                _ => continue,
            };

            let compiled = compile(&policy, &self.limits)?;
            let clause = policy::select_clause(&compiled, tx).ok_or(StructuralError::MixedAssets {
                index,
                expected: asset_id,
                found: consumed.asset_id,
            })?;
            if !policy::evaluate_rule(clause, tx) {
                return Err(ValidationError::PolicyViolation {
                    clause_index: clause.index,
                    condition: clause.source.condition.clone(),
                    rule: clause.source.rule.clone(),
                });
            }
        }

        Ok(())
    }
}

fn check_shape(tx: &Transaction) -> CheckResult<()> {
    let expected = tx.compute_id();
    if tx.id != expected {
        return Err(StructuralError::IdMismatch {
            expected,
            actual: tx.id,
        }
        .into());
    }
    if tx.inputs.is_empty() {
        return Err(StructuralError::NoInputs.into());
    }
    if tx.outputs.is_empty() {
        return Err(StructuralError::NoOutputs.into());
    }

    for (index, output) in tx.outputs.iter().enumerate() {
        if output.amount == 0 {
            return Err(StructuralError::ZeroAmount { index }.into());
        }
        let keys = output.condition.public_keys.len();
        let threshold = output.condition.threshold;
        if threshold == 0 || threshold as usize > keys {
            return Err(StructuralError::InvalidThreshold {
                index,
                threshold,
                keys,
            }
            .into());
        }
    }

    let matches = matches!(
        (tx.operation, &tx.asset),
        (Operation::Create, TxAsset::Inline(_)) | (Operation::Transfer, TxAsset::Reference { .. })
    );
    if !matches {
        return Err(StructuralError::AssetMismatch {
            operation: tx.operation.as_str(),
        }
        .into());
    }

    Ok(())
}

fn resolve_create(tx: &Transaction) -> CheckResult<Resolved> {
    let input = match tx.inputs.as_slice() {
        [input] if input.fulfills.is_none() => input,
        _ => return Err(StructuralError::InvalidCreateInput.into()),
    };
    if input.owners_before.is_empty() {
        return Err(StructuralError::NoOwners { index: 0 }.into());
    }

    Ok(Resolved {
        conditions: vec![Condition::all_of(input.owners_before.clone())],
        consumed: Vec::new(),
        policy: tx.asset_payload().and_then(|payload| payload.policy.clone()),
    })
}

fn resolve_transfer<L: Lookup + ?Sized>(tx: &Transaction, lookup: &L) -> CheckResult<Resolved> {
    let mut seen = HashSet::with_capacity(tx.inputs.len());
    let mut conditions = Vec::with_capacity(tx.inputs.len());
    let mut consumed = Vec::with_capacity(tx.inputs.len());

    for (index, input) in tx.inputs.iter().enumerate() {
        let output_ref = input
            .fulfills
            .ok_or(StructuralError::MissingOutputRef { index })?;
        if input.owners_before.is_empty() {
            return Err(StructuralError::NoOwners { index }.into());
        }
        if !seen.insert(output_ref) {
            return Err(StructuralError::DuplicateInput { output: output_ref }.into());
        }

        let source = lookup.get_transaction(&output_ref.tx_id);
        let output = source
            .as_ref()
            .and_then(|source| source.outputs.get(output_ref.index as usize))
            .ok_or(StructuralError::UnknownOutput {
                index,
                output: output_ref,
            })?;
        if input.owners_before.as_slice() != output.public_keys() {
            return Err(StructuralError::OwnersMismatch {
                index,
                output: output_ref,
            }
            .into());
        }

        conditions.push(output.condition.clone());
        consumed.push(Consumed {
            output: output.clone(),
            asset_id: source.as_ref().map_or(output_ref.tx_id, |s| s.asset_id()),
        });
    }

    let asset_id = tx.asset_id();
    let asset = lookup
        .get_asset(&asset_id)
        .ok_or(StructuralError::UnknownAsset { asset_id })?;

    Ok(Resolved {
        conditions,
        consumed,
        policy: asset.payload.policy,
    })
}

fn compile(policy: &Policy, limits: &PolicyConfig) -> CheckResult<CompiledPolicy> {
    policy::compile(policy, limits).map_err(|e| {
        let clause_index = match &e {
            PolicyError::InvalidClause { clause_index, .. } => *clause_index,
            _ => 0,
        };
        ValidationError::Structural(StructuralError::InvalidPolicy {
            clause_index,
            message: e.to_string(),
        })
    })
}
