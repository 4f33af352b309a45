//! Recursive-descent parser producing the policy AST
//!
//! The grammar is closed: only transaction field paths, literals, comparisons,
//! `AND` / `OR`, parentheses and the `LEN` / `AMOUNT` aggregates exist.

use super::lexer::{tokenize, Token, TokenKind};
use super::PolicyError;
use crate::config::PolicyConfig;
use std::cmp::Ordering;

/// Boolean expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// True when any branch is true
    Or(Vec<Expr>),
    /// True when every branch is true
    And(Vec<Expr>),
    /// Binary comparison
    Compare {
        /// Operator
        op: CompareOp,
        /// Left operand
        lhs: Operand,
        /// Right operand
        rhs: Operand,
    },
    /// Bare operand, true iff it resolves to boolean `true`
    Truth(Operand),
}

impl Expr {
    /// True when the expression constrains `AMOUNT(...)`
    pub fn mentions_amount(&self) -> bool {
        match self {
            Expr::Or(branches) | Expr::And(branches) => {
                branches.iter().any(Expr::mentions_amount)
            }
            Expr::Compare { lhs, rhs, .. } => {
                matches!(lhs, Operand::Amount) || matches!(rhs, Operand::Amount)
            }
            Expr::Truth(operand) => matches!(operand, Operand::Amount),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Apply to an ordering
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Comparable value source
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Constant
    Literal(Literal),
    /// Transaction field
    Field(FieldRef),
    /// `LEN(path)`
    Len(FieldRef),
    /// `AMOUNT(transaction.outputs)`
    Amount,
}

/// Literal constant
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer
    Int(i128),
    /// Decimal number
    Float(f64),
    /// Quoted string
    Str(String),
    /// `TRUE` / `FALSE`
    Bool(bool),
}

/// Path into the transaction under evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    /// `transaction.operation`
    Operation,
    /// `transaction.metadata[...]...`
    Metadata(Vec<Accessor>),
    /// `transaction.inputs` (LEN only)
    Inputs,
    /// `transaction.inputs[i].owners_before[j]?`
    InputOwners {
        /// Input position
        input: usize,
        /// Owner position, whole list when absent
        owner: Option<usize>,
    },
    /// `transaction.outputs` (LEN only)
    Outputs,
    /// `transaction.outputs[i].public_keys[j]?`
    OutputKeys {
        /// Output position
        output: usize,
        /// Key position, whole list when absent
        key: Option<usize>,
    },
    /// `transaction.outputs[i].amount`
    OutputAmount {
        /// Output position
        output: usize,
    },
    /// `transaction.outputs[i].threshold`
    OutputThreshold {
        /// Output position
        output: usize,
    },
}

impl FieldRef {
    fn is_sequence(&self) -> bool {
        matches!(
            self,
            FieldRef::Inputs
                | FieldRef::Outputs
                | FieldRef::Metadata(_)
                | FieldRef::InputOwners { owner: None, .. }
                | FieldRef::OutputKeys { key: None, .. }
        )
    }
}

/// Step inside the metadata document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

/// Parse a single expression under the configured limits
pub fn parse_expression(source: &str, limits: &PolicyConfig) -> Result<Expr, PolicyError> {
    if source.len() > limits.max_expression_len {
        return Err(PolicyError::TooLong {
            len: source.len(),
            max: limits.max_expression_len,
        });
    }

    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(PolicyError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth: limits.max_nesting_depth,
        end: source.len(),
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(PolicyError::Syntax {
            offset: token.offset,
            message: "unexpected trailing input".to_string(),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |t| t.offset)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, PolicyError> {
        Err(PolicyError::Syntax {
            offset: self.offset(),
            message: message.into(),
        })
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), PolicyError> {
        if self.peek_kind() == Some(&kind) {
            self.pos += 1;
            Ok(())
        } else {
            self.error(format!("expected {}", what))
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(name)) if name == keyword)
    }

    fn parse_or(&mut self) -> Result<Expr, PolicyError> {
        let mut branches = vec![self.parse_and()?];
        while self.at_keyword("OR") {
            self.pos += 1;
            branches.push(self.parse_and()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Expr::Or(branches)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, PolicyError> {
        let mut branches = vec![self.parse_unary()?];
        while self.at_keyword("AND") {
            self.pos += 1;
            branches.push(self.parse_unary()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Expr::And(branches)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, PolicyError> {
        if self.peek_kind() == Some(&TokenKind::LParen) {
            self.pos += 1;
            self.depth += 1;
            if self.depth > self.max_depth {
                return Err(PolicyError::TooDeep {
                    max: self.max_depth,
                });
            }
            let inner = self.parse_or()?;
            self.expect(TokenKind::RParen, "`)`")?;
            self.depth -= 1;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, PolicyError> {
        let lhs = self.parse_operand()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => CompareOp::Eq,
            Some(TokenKind::Ne) => CompareOp::Ne,
            Some(TokenKind::Lt) => CompareOp::Lt,
            Some(TokenKind::Le) => CompareOp::Le,
            Some(TokenKind::Gt) => CompareOp::Gt,
            Some(TokenKind::Ge) => CompareOp::Ge,
            _ => return Ok(Expr::Truth(lhs)),
        };
        self.pos += 1;
        let rhs = self.parse_operand()?;
        Ok(Expr::Compare { op, lhs, rhs })
    }

    fn parse_operand(&mut self) -> Result<Operand, PolicyError> {
        let offset = self.offset();
        let token = match self.next() {
            Some(token) => token,
            None => return self.error("expected operand"),
        };

        match token.kind {
            TokenKind::Int(n) => Ok(Operand::Literal(Literal::Int(n))),
            TokenKind::Float(n) => Ok(Operand::Literal(Literal::Float(n))),
            TokenKind::Str(s) => Ok(Operand::Literal(Literal::Str(s))),
            TokenKind::Ident(name) => match name.as_str() {
                "TRUE" | "True" | "true" => Ok(Operand::Literal(Literal::Bool(true))),
                "FALSE" | "False" | "false" => Ok(Operand::Literal(Literal::Bool(false))),
                "LEN" => {
                    self.expect(TokenKind::LParen, "`(` after LEN")?;
                    let field = self.parse_path()?;
                    self.expect(TokenKind::RParen, "`)`")?;
                    if !field.is_sequence() {
                        return Err(PolicyError::Syntax {
                            offset,
                            message: "LEN expects a sequence".to_string(),
                        });
                    }
                    Ok(Operand::Len(field))
                }
                "AMOUNT" => {
                    self.expect(TokenKind::LParen, "`(` after AMOUNT")?;
                    let field = self.parse_path()?;
                    self.expect(TokenKind::RParen, "`)`")?;
                    if field != FieldRef::Outputs {
                        return Err(PolicyError::Syntax {
                            offset,
                            message: "AMOUNT expects transaction.outputs".to_string(),
                        });
                    }
                    Ok(Operand::Amount)
                }
                "transaction" => {
                    self.pos -= 1;
                    let field = self.parse_path()?;
                    if matches!(field, FieldRef::Inputs | FieldRef::Outputs) {
                        return Err(PolicyError::Syntax {
                            offset,
                            message: "inputs/outputs are only valid inside LEN or AMOUNT"
                                .to_string(),
                        });
                    }
                    Ok(Operand::Field(field))
                }
                other => Err(PolicyError::Syntax {
                    offset,
                    message: format!("unknown identifier `{}`", other),
                }),
            },
            _ => Err(PolicyError::Syntax {
                offset,
                message: "expected operand".to_string(),
            }),
        }
    }

    fn parse_path(&mut self) -> Result<FieldRef, PolicyError> {
        if !self.at_keyword("transaction") {
            return self.error("expected `transaction`");
        }
        self.pos += 1;
        self.expect(TokenKind::Dot, "`.`")?;

        match self.ident()?.as_str() {
            "operation" => Ok(FieldRef::Operation),
            "metadata" => {
                let mut accessors = Vec::new();
                loop {
                    match self.peek_kind() {
                        Some(TokenKind::LBracket) => {
                            self.pos += 1;
                            let accessor = match self.next().map(|t| t.kind) {
                                Some(TokenKind::Str(key)) => Accessor::Key(key),
                                Some(TokenKind::Int(n)) => Accessor::Index(self.to_index(n)?),
                                _ => return self.error("expected string key or index"),
                            };
                            self.expect(TokenKind::RBracket, "`]`")?;
                            accessors.push(accessor);
                        }
                        Some(TokenKind::Dot) => {
                            self.pos += 1;
                            accessors.push(Accessor::Key(self.ident()?));
                        }
                        _ => break,
                    }
                }
                Ok(FieldRef::Metadata(accessors))
            }
            "inputs" => {
                let Some(input) = self.optional_index()? else {
                    return Ok(FieldRef::Inputs);
                };
                self.expect(TokenKind::Dot, "`.owners_before`")?;
                match self.ident()?.as_str() {
                    "owners_before" => Ok(FieldRef::InputOwners {
                        input,
                        owner: self.optional_index()?,
                    }),
                    other => self.error(format!("unknown input field `{}`", other)),
                }
            }
            "outputs" => {
                let Some(output) = self.optional_index()? else {
                    return Ok(FieldRef::Outputs);
                };
                self.expect(TokenKind::Dot, "output field")?;
                match self.ident()?.as_str() {
                    "public_keys" => Ok(FieldRef::OutputKeys {
                        output,
                        key: self.optional_index()?,
                    }),
                    "amount" => Ok(FieldRef::OutputAmount { output }),
                    "threshold" => Ok(FieldRef::OutputThreshold { output }),
                    other => self.error(format!("unknown output field `{}`", other)),
                }
            }
            other => self.error(format!("unknown transaction field `{}`", other)),
        }
    }

    fn ident(&mut self) -> Result<String, PolicyError> {
        match self.peek_kind() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.error("expected field name"),
        }
    }

    fn optional_index(&mut self) -> Result<Option<usize>, PolicyError> {
        if self.peek_kind() != Some(&TokenKind::LBracket) {
            return Ok(None);
        }
        self.pos += 1;
        let index = match self.next().map(|t| t.kind) {
            Some(TokenKind::Int(n)) => self.to_index(n)?,
            _ => return self.error("expected index"),
        };
        self.expect(TokenKind::RBracket, "`]`")?;
        Ok(Some(index))
    }

    fn to_index(&self, n: i128) -> Result<usize, PolicyError> {
        usize::try_from(n).or_else(|_| self.error("index must be a non-negative integer"))
    }
}
