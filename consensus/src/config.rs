//! Configuration for consensus node

use asset_ledger::{KeyPair, PrivateKey};
use serde::{Deserialize, Serialize};

/// Consensus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node ID
    pub node_id: String,

    /// Validator signing seed (hex, 32 bytes). Empty means a fresh random key.
    pub validator_seed: String,

    /// Block and vote commit settings
    pub consensus: ConsensusConfig,

    /// Ledger configuration
    pub ledger: asset_ledger::Config,
}

/// Block and vote commit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Attempts per block or vote write before a conflict is surfaced
    pub max_commit_retries: u32,

    /// Upper bound on transactions per block
    pub max_block_transactions: usize,

    /// Base delay between commit attempts (ms), multiplied by the attempt number
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            validator_seed: String::new(),
            consensus: ConsensusConfig::default(),
            ledger: asset_ledger::Config::default(),
        }
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 5,
            max_block_transactions: 1000,
            retry_backoff_ms: 5,
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
        let mut config = Config {
            ledger: asset_ledger::Config::from_env()?,
            ..Config::default()
        };

        if let Ok(node_id) = std::env::var("CONSENSUS_NODE_ID") {
            config.node_id = node_id;
        }

        if let Ok(seed) = std::env::var("CONSENSUS_VALIDATOR_SEED") {
            config.validator_seed = seed;
        }

        if let Ok(retries) = std::env::var("CONSENSUS_MAX_COMMIT_RETRIES") {
            config.consensus.max_commit_retries = retries.parse().map_err(|e| {
                crate::Error::Config(format!("CONSENSUS_MAX_COMMIT_RETRIES: {}", e))
            })?;
        }

        Ok(config)
    }

    /// Validator key pair derived from `validator_seed`
    pub fn keypair(&self) -> crate::Result<KeyPair> {
        if self.validator_seed.is_empty() {
            return Ok(KeyPair::generate());
        }
        let private_key = PrivateKey::from_hex(&self.validator_seed)
            .map_err(|e| crate::Error::Config(format!("Invalid validator seed: {}", e)))?;
        Ok(KeyPair::from_seed(private_key.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.node_id, "node-1");
        assert_eq!(config.consensus.max_commit_retries, 5);
        assert_eq!(config.ledger.policy.max_nesting_depth, 32);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "node_id = \"validator-a\"\nvalidator_seed = \"{}\"\n\n[consensus]\nmax_commit_retries = 2\n\n[ledger.policy]\nmax_expression_len = 128",
            "11".repeat(32)
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.node_id, "validator-a");
        assert_eq!(config.consensus.max_commit_retries, 2);
        assert_eq!(config.consensus.max_block_transactions, 1000);
        assert_eq!(config.ledger.policy.max_expression_len, 128);

        let expected = KeyPair::from_seed(&[0x11; 32]).public_key();
        assert_eq!(config.keypair().unwrap().public_key(), expected);
    }

    #[test]
    fn test_invalid_seed() {
        let config = Config {
            validator_seed: "not-hex".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.keypair(), Err(crate::Error::Config(_))));
    }
}
