//! Interpreter for parsed policy expressions
//!
//! Evaluation reads only the transaction being judged. Missing fields,
//! out-of-range indexes and type mismatches make a comparison false.

use super::parser::{Accessor, CompareOp, Expr, FieldRef, Literal, Operand};
use crate::transaction::Transaction;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i128),
    Float(f64),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    Missing,
}

impl Value {
    fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i as i128)
                } else if let Some(u) = n.as_u64() {
                    Value::Int(u as i128)
                } else {
                    n.as_f64().map_or(Value::Missing, Value::Float)
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Null | serde_json::Value::Object(_) => Value::Missing,
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(n) => Value::Float(*n),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }
}

/// Evaluate `expr` against `tx`
pub(crate) fn evaluate(expr: &Expr, tx: &Transaction) -> bool {
    match expr {
        Expr::Or(branches) => branches.iter().any(|branch| evaluate(branch, tx)),
        Expr::And(branches) => branches.iter().all(|branch| evaluate(branch, tx)),
        Expr::Compare { op, lhs, rhs } => compare(*op, &operand(lhs, tx), &operand(rhs, tx)),
        Expr::Truth(value) => operand(value, tx) == Value::Bool(true),
    }
}

fn operand(operand: &Operand, tx: &Transaction) -> Value {
    match operand {
        Operand::Literal(literal) => literal.into(),
        Operand::Field(field) => resolve(field, tx),
        Operand::Len(field) => length(field, tx).map_or(Value::Missing, |n| Value::Int(n as i128)),
        Operand::Amount => Value::Int(tx.output_total() as i128),
    }
}

fn metadata<'a>(path: &[Accessor], tx: &'a Transaction) -> Option<&'a serde_json::Value> {
    let (first, rest) = match path.split_first() {
        Some(split) => split,
        None => return None,
    };
    let mut current = match first {
        Accessor::Key(key) => tx.metadata.get(key)?,
        Accessor::Index(_) => return None,
    };
    for accessor in rest {
        current = match (accessor, current) {
            (Accessor::Key(key), serde_json::Value::Object(map)) => map.get(key)?,
            (Accessor::Index(i), serde_json::Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

fn key_value(key: &crate::types::PublicKey) -> Value {
    Value::Str(key.to_string())
}

fn resolve(field: &FieldRef, tx: &Transaction) -> Value {
    let resolved = match field {
        FieldRef::Operation => Some(Value::Str(tx.operation.as_str().to_string())),
        FieldRef::Metadata(path) => metadata(path, tx).map(Value::from_json),
        FieldRef::InputOwners { input, owner } => tx.inputs.get(*input).and_then(|input| {
            match owner {
                Some(i) => input.owners_before.get(*i).map(key_value),
                None => Some(Value::List(input.owners_before.iter().map(key_value).collect())),
            }
        }),
        FieldRef::OutputKeys { output, key } => tx.outputs.get(*output).and_then(|output| {
            match key {
                Some(i) => output.public_keys().get(*i).map(key_value),
                None => Some(Value::List(output.public_keys().iter().map(key_value).collect())),
            }
        }),
        FieldRef::OutputAmount { output } => tx
            .outputs
            .get(*output)
            .map(|output| Value::Int(output.amount as i128)),
        FieldRef::OutputThreshold { output } => tx
            .outputs
            .get(*output)
            .map(|output| Value::Int(output.condition.threshold as i128)),
        // Rejected by the parser outside LEN/AMOUNT
        FieldRef::Inputs | FieldRef::Outputs => None,
    };
    resolved.unwrap_or(Value::Missing)
}

fn length(field: &FieldRef, tx: &Transaction) -> Option<usize> {
    match field {
        FieldRef::Inputs => Some(tx.inputs.len()),
        FieldRef::Outputs => Some(tx.outputs.len()),
        FieldRef::InputOwners { input, owner: None } => {
            tx.inputs.get(*input).map(|input| input.owners_before.len())
        }
        FieldRef::OutputKeys { output, key: None } => {
            tx.outputs.get(*output).map(|output| output.public_keys().len())
        }
        FieldRef::Metadata(path) => match metadata(path, tx)? {
            serde_json::Value::Array(items) => Some(items.len()),
            serde_json::Value::Object(map) => Some(map.len()),
            serde_json::Value::String(s) => Some(s.chars().count()),
            _ => None,
        },
        _ => None,
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => return equality(op, a == b),
        (Value::List(a), Value::List(b)) => return equality(op, a == b),
        _ => None,
    };
    ordering.map_or(false, |ordering| op.matches(ordering))
}

fn equality(op: CompareOp, equal: bool) -> bool {
    match op {
        CompareOp::Eq => equal,
        CompareOp::Ne => !equal,
        _ => false,
    }
}
