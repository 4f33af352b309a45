//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Id determinism: same content → same id; reordering or metadata edits change it
//! - Conservation: a TRANSFER without policy moves exactly what it consumes
//! - Policy first-match: the earliest true condition selects the clause
//! - Double-spend exclusion: one output, at most one accepted spender
//! - Threshold spends: a k-of-n output opens with any k of its keys, never fewer

use asset_ledger::{
    policy::{compile, select_clause},
    types::{Clause, Metadata, Output, Policy},
    Block, Ed25519Crypto, InMemoryStore, KeyPair, Lookup, PolicyConfig, PublicKey, Signature,
    StructuralError, Transaction, TransactionValidator, ValidationError, Writer,
};
use proptest::prelude::*;
use serde_json::json;

/// Strategy for generating split amounts (every part positive)
fn parts_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..10_000, 1..8)
}

/// Strategy for generating workflow metadata
fn metadata_strategy() -> impl Strategy<Value = Metadata> {
    ("[A-Z_]{1,12}", 0i64..1000).prop_map(|(state, level)| {
        json!({ "state": state, "level": level })
            .as_object()
            .cloned()
            .unwrap_or_default()
    })
}

fn keypair(seed: u8) -> KeyPair {
    KeyPair::from_seed(&[seed; 32])
}

fn validator() -> TransactionValidator {
    TransactionValidator::new(PolicyConfig::default())
}

fn commit(store: &InMemoryStore, txs: Vec<Transaction>) -> asset_ledger::Result<()> {
    let previous = store.get_block_tip();
    let block = Block {
        id: Block::compute_id(&previous, &txs),
        previous_block_id: previous,
        transactions: txs,
        proposer: PublicKey::from_bytes([0; 32]),
        signature: Signature::from_bytes([0; 64]),
    };
    store.commit_block(&block, &previous)
}

fn funded(store: &InMemoryStore, owner: &KeyPair, amount: u64) -> Transaction {
    let create = Transaction::create(
        vec![owner.public_key()],
        vec![Output::new(vec![owner.public_key()], amount)],
        None,
        None,
    )
    .sign(&[owner.private_key().clone()], &Ed25519Crypto)
    .unwrap();
    commit(store, vec![create.clone()]).unwrap();
    create
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: id is a pure function of content
    #[test]
    fn prop_id_deterministic(parts in parts_strategy(), metadata in metadata_strategy()) {
        let owner = PublicKey::from_bytes([1; 32]);
        let outputs: Vec<Output> = parts.iter().map(|&a| Output::new(vec![owner], a)).collect();

        let a = Transaction::create(vec![owner], outputs.clone(), None, Some(metadata.clone()));
        let b = Transaction::create(vec![owner], outputs, None, Some(metadata));

        prop_assert_eq!(a.id, b.id);
        prop_assert_eq!(a.compute_id(), a.compute_id());

        // JSON wire form preserves identity
        let decoded: Transaction = serde_json::from_str(&serde_json::to_string(&a).unwrap()).unwrap();
        prop_assert_eq!(decoded.compute_id(), a.id);
    }

    /// Property: reordering outputs or editing metadata changes the id
    #[test]
    fn prop_id_order_sensitive(
        parts in parts_strategy(),
        metadata in metadata_strategy(),
        extra in 1i64..1000,
    ) {
        let owner = PublicKey::from_bytes([1; 32]);
        let outputs: Vec<Output> = parts.iter().map(|&a| Output::new(vec![owner], a)).collect();
        let tx = Transaction::create(vec![owner], outputs.clone(), None, Some(metadata.clone()));

        let mut reversed = outputs;
        reversed.reverse();
        if reversed != tx.outputs {
            let swapped = Transaction::create(vec![owner], reversed, None, Some(metadata.clone()));
            prop_assert_ne!(swapped.id, tx.id);
        }

        let mut edited = metadata;
        edited.insert("extra".to_string(), json!(extra));
        let edited = Transaction::create(vec![owner], tx.outputs.clone(), None, Some(edited));
        prop_assert_ne!(edited.id, tx.id);
    }

    /// Property: first clause with a true condition is selected
    #[test]
    fn prop_policy_first_match(false_before in 0usize..5, true_count in 1usize..4) {
        let mut clauses: Vec<Clause> = (0..false_before)
            .map(|i| Clause::new(format!("LEN(transaction.outputs) == {}", 100 + i), "TRUE"))
            .collect();
        clauses.extend((0..true_count).map(|_| Clause::new("transaction.operation == 'CREATE'", "TRUE")));
        let compiled = compile(&Policy::new(clauses), &PolicyConfig::default()).unwrap();

        let owner = PublicKey::from_bytes([2; 32]);
        let tx = Transaction::create(vec![owner], vec![Output::new(vec![owner], 1)], None, None);

        let selected = select_clause(&compiled, &tx).map(|clause| clause.index);
        prop_assert_eq!(selected, Some(false_before));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: TRANSFER without policy must conserve amount
    #[test]
    fn prop_conservation(parts in parts_strategy(), bump in 1u64..100, target in any::<prop::sample::Index>()) {
        let alice = keypair(1);
        let bob = keypair(2);
        let store = InMemoryStore::new();
        let total: u64 = parts.iter().sum();
        let create = funded(&store, &alice, total);

        let transfer = |amounts: &[u64]| {
            Transaction::transfer(
                create.to_inputs(),
                amounts.iter().map(|&a| Output::new(vec![bob.public_key()], a)).collect(),
                create.id,
                None,
            )
            .sign(&[alice.private_key().clone()], &Ed25519Crypto)
            .unwrap()
        };

        prop_assert!(validator().validate(&transfer(&parts), &store).is_ok());

        let mut inflated = parts.clone();
        inflated[target.index(parts.len())] += bump;
        let err = validator().validate(&transfer(&inflated), &store).unwrap_err();
        prop_assert_eq!(
            err,
            ValidationError::Structural(StructuralError::AmountMismatch {
                inputs: total as u128,
                outputs: (total + bump) as u128,
            })
        );
    }

    /// Property: of N competing spends of one output, exactly one commits
    #[test]
    fn prop_double_spend_exclusion(competitors in 2usize..6) {
        let alice = keypair(1);
        let store = InMemoryStore::new();
        let create = funded(&store, &alice, 10);

        let spends: Vec<Transaction> = (0..competitors)
            .map(|i| {
                Transaction::transfer(
                    create.to_inputs(),
                    vec![Output::new(vec![keypair(10 + i as u8).public_key()], 10)],
                    create.id,
                    None,
                )
                .sign(&[alice.private_key().clone()], &Ed25519Crypto)
                .unwrap()
            })
            .collect();

        // All pass validation against the same pre-commit state
        for tx in &spends {
            prop_assert!(validator().validate(tx, &store).is_ok());
        }

        let mut accepted = 0;
        for tx in &spends {
            if validator().validate(tx, &store).is_ok() && commit(&store, vec![tx.clone()]).is_ok() {
                accepted += 1;
            }
        }
        prop_assert_eq!(accepted, 1);

        let spent_by = store.spent_by(&create.to_inputs()[0].fulfills.unwrap());
        prop_assert_eq!(spent_by, Some(spends[0].id));
    }

    /// Property: a k-of-n output is spendable with s signers iff s >= k
    #[test]
    fn prop_threshold_spend(
        (keys, threshold, signers) in (1u8..5)
            .prop_flat_map(|n| (Just(n), 1..=n))
            .prop_flat_map(|(n, k)| (Just(n), Just(k), 1..=n))
    ) {
        let owners: Vec<KeyPair> = (0..keys).map(|i| keypair(40 + i)).collect();
        let issuer = keypair(1);
        let store = InMemoryStore::new();

        let locked = Transaction::create(
            vec![issuer.public_key()],
            vec![Output::new(owners.iter().map(KeyPair::public_key).collect(), 7)
                .with_threshold(u32::from(threshold))],
            None,
            None,
        )
        .sign(&[issuer.private_key().clone()], &Ed25519Crypto)
        .unwrap();
        commit(&store, vec![locked.clone()]).unwrap();

        let signing_keys: Vec<_> = owners[..signers as usize]
            .iter()
            .map(|owner| owner.private_key().clone())
            .collect();
        let spend = Transaction::transfer(
            locked.to_inputs(),
            vec![Output::new(vec![keypair(2).public_key()], 7)],
            locked.id,
            None,
        )
        .sign(&signing_keys, &Ed25519Crypto)
        .unwrap();

        let result = validator().validate(&spend, &store);
        if signers >= threshold {
            prop_assert!(result.is_ok(), "{:?}", result);
        } else {
            prop_assert_eq!(result, Err(ValidationError::InvalidSignature { input_index: 0 }));
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_conditional_commit_rejects_validated_duplicate_spend() {
        let alice = keypair(1);
        let store = InMemoryStore::new();
        let create = funded(&store, &alice, 5);

        let spend = |recipient: u8| {
            Transaction::transfer(
                create.to_inputs(),
                vec![Output::new(vec![keypair(recipient).public_key()], 5)],
                create.id,
                None,
            )
            .sign(&[alice.private_key().clone()], &Ed25519Crypto)
            .unwrap()
        };
        let (first, second) = (spend(3), spend(4));

        // Both validated against the same snapshot before either commits
        validator().validate(&first, &store).unwrap();
        validator().validate(&second, &store).unwrap();

        commit(&store, vec![first.clone()]).unwrap();
        assert!(commit(&store, vec![second.clone()]).unwrap_err().is_retryable());

        // Re-validation after the conflict reaches the terminal outcome
        assert!(matches!(
            validator().validate(&second, &store),
            Err(ValidationError::DoubleSpend { spent_by, .. }) if spent_by == first.id
        ));
    }
}
