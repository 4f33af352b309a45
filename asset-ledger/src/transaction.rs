//! CREATE / TRANSFER transactions
//!
//! Transactions are built unsigned, then [`Transaction::sign`] fills in every
//! input's fulfillment and fixes the content-addressed id. The id covers all
//! fields including fulfillments; the signing payload covers all fields except
//! fulfillments.

use crate::canonical::{write_input, CanonicalSerializer, WriteCanonical};
use crate::crypto::{CryptoAdapter, PrivateKey};
use crate::types::{
    AssetPayload, Condition, Fulfillment, Hash, Input, Metadata, Operation, Output, OutputRef,
    PublicKey, TxAsset,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Asset transfer transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash
    pub id: Hash,
    /// CREATE or TRANSFER
    pub operation: Operation,
    /// Inline payload (CREATE) or asset reference (TRANSFER)
    pub asset: TxAsset,
    /// Ordered inputs
    pub inputs: Vec<Input>,
    /// Ordered outputs
    pub outputs: Vec<Output>,
    /// Workflow state read by policies; not part of asset identity
    #[serde(default)]
    pub metadata: Metadata,
}

impl Transaction {
    /// Build a CREATE transaction with one synthetic input owned by `owners`.
    ///
    /// The asset payload defaults to an empty document without policy.
    pub fn create(
        owners: Vec<PublicKey>,
        outputs: Vec<Output>,
        asset: Option<AssetPayload>,
        metadata: Option<Metadata>,
    ) -> Self {
        let input = Input {
            fulfills: None,
            owners_before: owners,
            fulfillment: None,
        };
        Self::assemble(
            Operation::Create,
            TxAsset::Inline(asset.unwrap_or_default()),
            vec![input],
            outputs,
            metadata,
        )
    }

    /// Build a TRANSFER of `asset_id` spending `inputs`.
    ///
    /// Inputs are usually obtained from [`Transaction::to_inputs`]; whether
    /// they resolve to unspent outputs is decided at validation time.
    pub fn transfer(
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        asset_id: Hash,
        metadata: Option<Metadata>,
    ) -> Self {
        Self::assemble(
            Operation::Transfer,
            TxAsset::Reference { id: asset_id },
            inputs,
            outputs,
            metadata,
        )
    }

    fn assemble(
        operation: Operation,
        asset: TxAsset,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        metadata: Option<Metadata>,
    ) -> Self {
        let mut tx = Self {
            id: Hash::GENESIS,
            operation,
            asset,
            inputs,
            outputs,
            metadata: metadata.unwrap_or_default(),
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Produce fulfillments for every input and recompute the id.
    ///
    /// Each input is signed by every supplied key among its `owners_before`,
    /// so a k-of-n output can be spent with k keys; whether enough keys
    /// signed is decided at validation time. Every input must be matched by
    /// at least one key, and every supplied key must be used by some input.
    pub fn sign<C: CryptoAdapter + ?Sized>(
        mut self,
        private_keys: &[PrivateKey],
        crypto: &C,
    ) -> Result<Self> {
        let keys: HashMap<PublicKey, &PrivateKey> = private_keys
            .iter()
            .map(|key| (crypto.public_key(key), key))
            .collect();
        if keys.len() != private_keys.len() {
            return Err(Error::Signing("duplicate private key supplied".to_string()));
        }

        let payload = self.signing_payload();
        let mut used: Vec<PublicKey> = Vec::with_capacity(keys.len());

        for (index, input) in self.inputs.iter_mut().enumerate() {
            if input.owners_before.is_empty() {
                return Err(Error::Signing(format!("input {} has no owners", index)));
            }

            let signatures: Vec<_> = input
                .owners_before
                .iter()
                .filter_map(|owner| keys.get(owner).map(|key| (owner, key)))
                .map(|(owner, key)| {
                    if !used.contains(owner) {
                        used.push(*owner);
                    }
                    crypto.sign(&payload, key)
                })
                .collect();
            if signatures.is_empty() {
                return Err(Error::Signing(format!(
                    "no private key for any owner of input {}",
                    index
                )));
            }
            input.fulfillment = Some(Fulfillment { signatures });
        }

        if used.len() != keys.len() {
            return Err(Error::Signing(format!(
                "{} private key(s) match no input owner",
                keys.len() - used.len()
            )));
        }

        self.id = self.compute_id();
        Ok(self)
    }

    /// Canonical serialization + SHA-256 over everything but the id
    pub fn compute_id(&self) -> Hash {
        let mut ser = CanonicalSerializer::new();
        self.write_body(&mut ser, true);
        ser.hash()
    }

    /// Bytes every fulfillment signs
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut ser = CanonicalSerializer::new();
        self.write_body(&mut ser, false);
        ser.finalize()
    }

    fn write_body(&self, ser: &mut CanonicalSerializer, with_fulfillments: bool) {
        ser.write_u8(self.operation as u8);
        self.asset.write_canonical(ser);
        ser.write_len(self.inputs.len());
        for input in &self.inputs {
            write_input(ser, input, with_fulfillments);
        }
        ser.write_len(self.outputs.len());
        for output in &self.outputs {
            output.write_canonical(ser);
        }
        ser.write_json(&serde_json::Value::Object(self.metadata.clone()));
    }

    /// Unsigned inputs spending each of this transaction's outputs
    pub fn to_inputs(&self) -> Vec<Input> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(index, output)| Input {
                fulfills: Some(OutputRef::new(self.id, index as u32)),
                owners_before: output.public_keys().to_vec(),
                fulfillment: None,
            })
            .collect()
    }

    /// Lineage this transaction belongs to (own id for CREATE)
    pub fn asset_id(&self) -> Hash {
        match &self.asset {
            TxAsset::Reference { id } => *id,
            TxAsset::Inline(_) => self.id,
        }
    }

    /// Inline payload, present on CREATE only
    pub fn asset_payload(&self) -> Option<&AssetPayload> {
        match &self.asset {
            TxAsset::Inline(payload) => Some(payload),
            TxAsset::Reference { .. } => None,
        }
    }

    /// Condition the synthetic CREATE input must satisfy
    pub fn create_condition(&self) -> Option<Condition> {
        match (self.operation, self.inputs.first()) {
            (Operation::Create, Some(input)) => {
                Some(Condition::all_of(input.owners_before.clone()))
            }
            _ => None,
        }
    }

    /// Outputs referenced by this transaction's inputs
    pub fn spent_outputs(&self) -> impl Iterator<Item = &OutputRef> {
        self.inputs.iter().filter_map(|input| input.fulfills.as_ref())
    }

    /// Sum of output amounts
    pub fn output_total(&self) -> u128 {
        self.outputs.iter().map(|output| output.amount as u128).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519Crypto, KeyPair};
    use serde_json::json;

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_create_defaults() {
        let alice = KeyPair::generate();
        let tx = Transaction::create(
            vec![alice.public_key()],
            vec![Output::new(vec![alice.public_key()], 1)],
            None,
            None,
        );

        assert_eq!(tx.operation, Operation::Create);
        assert_eq!(tx.inputs.len(), 1);
        assert!(tx.inputs[0].fulfills.is_none());
        assert_eq!(tx.asset_payload(), Some(&AssetPayload::default()));
        assert_eq!(tx.asset_id(), tx.id);
    }

    #[test]
    fn test_sign_fills_fulfillments_and_changes_id() {
        let alice = KeyPair::generate();
        let tx = Transaction::create(
            vec![alice.public_key()],
            vec![Output::new(vec![alice.public_key()], 1)],
            None,
            None,
        );
        let unsigned_id = tx.id;
        let payload = tx.signing_payload();

        let signed = tx.sign(&[alice.private_key().clone()], &Ed25519Crypto).unwrap();
        assert_ne!(signed.id, unsigned_id);
        assert_eq!(signed.id, signed.compute_id());
        // Signing does not alter the signed payload
        assert_eq!(signed.signing_payload(), payload);

        let fulfillment = signed.inputs[0].fulfillment.as_ref().unwrap();
        assert_eq!(fulfillment.signatures.len(), 1);
        assert_eq!(fulfillment.signatures[0].public_key, alice.public_key());
    }

    #[test]
    fn test_sign_with_subset_of_owners() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let carol = KeyPair::generate();
        let tx = Transaction::create(
            vec![alice.public_key(), bob.public_key()],
            vec![Output::new(vec![alice.public_key()], 1)],
            None,
            None,
        );

        let partial = tx.clone().sign(&[bob.private_key().clone()], &Ed25519Crypto).unwrap();
        let fulfillment = partial.inputs[0].fulfillment.as_ref().unwrap();
        assert_eq!(fulfillment.signatures.len(), 1);
        assert_eq!(fulfillment.signatures[0].public_key, bob.public_key());

        let result = tx.sign(&[carol.private_key().clone()], &Ed25519Crypto);
        assert!(matches!(result, Err(Error::Signing(_))));
    }

    #[test]
    fn test_sign_extra_key_fails() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let tx = Transaction::create(
            vec![alice.public_key()],
            vec![Output::new(vec![alice.public_key()], 1)],
            None,
            None,
        );

        let result = tx.sign(
            &[alice.private_key().clone(), bob.private_key().clone()],
            &Ed25519Crypto,
        );
        assert!(matches!(result, Err(Error::Signing(_))));
    }

    #[test]
    fn test_id_is_order_sensitive() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let outputs = vec![
            Output::new(vec![alice.public_key()], 1),
            Output::new(vec![bob.public_key()], 2),
        ];
        let mut reversed = outputs.clone();
        reversed.reverse();

        let a = Transaction::create(vec![alice.public_key()], outputs, None, None);
        let b = Transaction::create(vec![alice.public_key()], reversed, None, None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_id_covers_metadata() {
        let alice = KeyPair::generate();
        let build = |state: &str| {
            Transaction::create(
                vec![alice.public_key()],
                vec![Output::new(vec![alice.public_key()], 1)],
                None,
                Some(metadata(json!({ "state": state }))),
            )
        };
        assert_eq!(build("INIT").id, build("INIT").id);
        assert_ne!(build("INIT").id, build("DONE").id);
    }

    #[test]
    fn test_to_inputs_projection() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let tx = Transaction::create(
            vec![alice.public_key()],
            vec![
                Output::new(vec![alice.public_key()], 3),
                Output::new(vec![bob.public_key()], 4),
            ],
            None,
            None,
        )
        .sign(&[alice.private_key().clone()], &Ed25519Crypto)
        .unwrap();

        let inputs = tx.to_inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].fulfills, Some(OutputRef::new(tx.id, 1)));
        assert_eq!(inputs[1].owners_before, vec![bob.public_key()]);
        assert!(inputs.iter().all(|input| input.fulfillment.is_none()));
    }

    #[test]
    fn test_json_roundtrip_preserves_id() {
        let alice = KeyPair::generate();
        let tx = Transaction::create(
            vec![alice.public_key()],
            vec![Output::new(vec![alice.public_key()], 1)],
            Some(AssetPayload::new("mix", json!({ "material": "secret sauce" }))),
            Some(metadata(json!({ "state": "INIT" }))),
        )
        .sign(&[alice.private_key().clone()], &Ed25519Crypto)
        .unwrap();

        let wire = serde_json::to_string(&tx).unwrap();
        let decoded: Transaction = serde_json::from_str(&wire).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.compute_id(), tx.id);
    }
}
