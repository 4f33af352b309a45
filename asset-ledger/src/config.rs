//! Configuration for the ledger

use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Policy evaluator limits
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Bounds applied when parsing policy expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Maximum source length of one condition or rule (bytes)
    pub max_expression_len: usize,

    /// Maximum parenthesis nesting
    pub max_nesting_depth: usize,

    /// Maximum clauses in one policy
    pub max_clauses: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_expression_len: 4096,
            max_nesting_depth: 32,
            max_clauses: 64,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(len) = std::env::var("LEDGER_POLICY_MAX_EXPRESSION_LEN") {
            config.policy.max_expression_len = len
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_POLICY_MAX_EXPRESSION_LEN: {}", e)))?;
        }

        if let Ok(depth) = std::env::var("LEDGER_POLICY_MAX_NESTING_DEPTH") {
            config.policy.max_nesting_depth = depth
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_POLICY_MAX_NESTING_DEPTH: {}", e)))?;
        }

        if let Ok(clauses) = std::env::var("LEDGER_POLICY_MAX_CLAUSES") {
            config.policy.max_clauses = clauses
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_POLICY_MAX_CLAUSES: {}", e)))?;
        }

        Ok(config)
    }
}
