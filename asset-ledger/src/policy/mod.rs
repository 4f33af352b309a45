//! Rule-policy evaluator
//!
//! An asset's creator attaches an ordered list of `(condition, rule)` clauses.
//! For every transaction in the lineage the first clause whose condition holds
//! is selected, and its rule must hold as well. Clauses are parsed once into a
//! closed AST ([`parser::Expr`]); nothing in a policy string is ever executed.
//!
//! # Example
//!
//! ```
//! use asset_ledger::config::PolicyConfig;
//! use asset_ledger::policy::{compile, evaluate_rule, select_clause};
//! use asset_ledger::types::{Clause, Output, Policy, PublicKey};
//! use asset_ledger::Transaction;
//!
//! let policy = Policy::new(vec![Clause::new(
//!     "transaction.metadata['state'] == 'INIT'",
//!     "AMOUNT(transaction.outputs) == 1",
//! )]);
//! let compiled = compile(&policy, &PolicyConfig::default()).unwrap();
//!
//! let owner = PublicKey::from_bytes([7; 32]);
//! let metadata = serde_json::json!({ "state": "INIT" });
//! let tx = Transaction::create(
//!     vec![owner],
//!     vec![Output::new(vec![owner], 1)],
//!     None,
//!     metadata.as_object().cloned(),
//! );
//!
//! let clause = select_clause(&compiled, &tx).unwrap();
//! assert!(evaluate_rule(clause, &tx));
//! ```

mod eval;
mod lexer;
pub mod parser;

use crate::config::PolicyConfig;
use crate::transaction::Transaction;
use crate::types::{Clause, ConservationMode, Policy};
use parser::{parse_expression, Expr};
use thiserror::Error;

/// Policy compilation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// Unparseable expression
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset in the source
        offset: usize,
        /// Description
        message: String,
    },

    /// Blank expression
    #[error("expression is empty")]
    Empty,

    /// Source exceeds the configured length
    #[error("expression length {len} exceeds limit {max}")]
    TooLong {
        /// Source length in bytes
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// Parenthesis nesting exceeds the configured depth
    #[error("expression nesting exceeds limit {max}")]
    TooDeep {
        /// Configured limit
        max: usize,
    },

    /// Policy has more clauses than configured
    #[error("policy has {count} clauses, limit is {max}")]
    TooManyClauses {
        /// Clause count
        count: usize,
        /// Configured limit
        max: usize,
    },

    /// Wraps an error with the clause it came from
    #[error("clause {clause_index} {part}: {reason}")]
    InvalidClause {
        /// Clause position
        clause_index: usize,
        /// `condition` or `rule`
        part: &'static str,
        /// Underlying error
        reason: Box<PolicyError>,
    },
}

/// Parsed clause
#[derive(Debug, Clone)]
pub struct CompiledClause {
    /// Position in the policy
    pub index: usize,
    /// Source clause, for diagnostics
    pub source: Clause,
    condition: Expr,
    rule: Expr,
}

impl CompiledClause {
    /// Whether a transaction selected by this clause skips the default
    /// conservation check
    pub fn overrides_conservation(&self) -> bool {
        match self.source.conservation {
            ConservationMode::Override => true,
            ConservationMode::Enforce => false,
            ConservationMode::Implicit => self.rule.mentions_amount(),
        }
    }
}

/// Parsed policy, clauses in declaration order
#[derive(Debug, Clone, Default)]
pub struct CompiledPolicy {
    clauses: Vec<CompiledClause>,
}

impl CompiledPolicy {
    /// Clauses in declaration order
    pub fn clauses(&self) -> &[CompiledClause] {
        &self.clauses
    }
}

/// Parse every clause of `policy`
pub fn compile(policy: &Policy, limits: &PolicyConfig) -> Result<CompiledPolicy, PolicyError> {
    if policy.clauses.len() > limits.max_clauses {
        return Err(PolicyError::TooManyClauses {
            count: policy.clauses.len(),
            max: limits.max_clauses,
        });
    }

    let wrap = |clause_index: usize, part: &'static str| {
        move |reason: PolicyError| PolicyError::InvalidClause {
            clause_index,
            part,
            reason: Box::new(reason),
        }
    };

    let clauses = policy
        .clauses
        .iter()
        .enumerate()
        .map(|(index, clause)| -> Result<CompiledClause, PolicyError> {
            Ok(CompiledClause {
                index,
                source: clause.clone(),
                condition: parse_expression(&clause.condition, limits)
                    .map_err(wrap(index, "condition"))?,
                rule: parse_expression(&clause.rule, limits).map_err(wrap(index, "rule"))?,
            })
        })
        .collect::<Result<Vec<_>, PolicyError>>()?;

    Ok(CompiledPolicy { clauses })
}

/// First clause whose condition holds for `tx`
pub fn select_clause<'a>(policy: &'a CompiledPolicy, tx: &Transaction) -> Option<&'a CompiledClause> {
    policy
        .clauses
        .iter()
        .find(|clause| eval::evaluate(&clause.condition, tx))
}

/// Evaluate the clause's rule against `tx`
pub fn evaluate_rule(clause: &CompiledClause, tx: &Transaction) -> bool {
    eval::evaluate(&clause.rule, tx)
}
