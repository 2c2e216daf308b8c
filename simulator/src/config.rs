use anyhow::{ensure, Context, Result};
use commonware_codec::DecodeExt;
use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::from_hex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use wagerline_types::ExecutionConfig;

pub const DEFAULT_BLOCK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 10_000;
pub const DEFAULT_MAX_BACKLOG: u64 = 64;
pub const DEFAULT_MAX_DEFERRED_BLOCKS: u64 = 16;

/// Free balance credited to a principal before the first block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    /// Hex-encoded ed25519 public key.
    pub public: String,
    pub balance: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub execution: ExecutionConfig,
    pub block_interval_ms: u64,
    pub mempool_capacity: usize,
    /// How far past its signer's next nonce a submitted transaction may be.
    pub max_backlog: u64,
    /// Blocks a future-nonce transaction may wait before it is evicted.
    pub max_deferred_blocks: u64,
    pub genesis: Vec<GenesisAllocation>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            block_interval_ms: DEFAULT_BLOCK_INTERVAL_MS,
            mempool_capacity: DEFAULT_MEMPOOL_CAPACITY,
            max_backlog: DEFAULT_MAX_BACKLOG,
            max_deferred_blocks: DEFAULT_MAX_DEFERRED_BLOCKS,
            genesis: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("parse simulator config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read simulator config {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.block_interval_ms > 0, "block_interval_ms must be > 0");
        ensure!(self.mempool_capacity > 0, "mempool_capacity must be > 0");
        ensure!(self.max_backlog > 0, "max_backlog must be > 0");
        ensure!(self.max_deferred_blocks > 0, "max_deferred_blocks must be > 0");
        ensure!(
            self.execution.max_duration_secs > 0,
            "execution.max_duration_secs must be > 0"
        );
        self.genesis_allocations()?;
        Ok(())
    }

    /// Decodes the configured genesis principals.
    pub fn genesis_allocations(&self) -> Result<Vec<(PublicKey, u64)>> {
        self.genesis
            .iter()
            .map(|allocation| {
                let raw = from_hex(allocation.public.trim_start_matches("0x"))
                    .with_context(|| format!("invalid genesis key hex: {}", allocation.public))?;
                let public = PublicKey::decode(&mut raw.as_slice())
                    .with_context(|| format!("invalid genesis key: {}", allocation.public))?;
                Ok((public, allocation.balance))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::Encode;
    use commonware_utils::hex;
    use wagerline_execution::mocks::create_account_keypair;
    use wagerline_types::ResolutionPolicy;

    #[test]
    fn parses_partial_yaml_with_defaults() {
        let (_, alice) = create_account_keypair(1);
        let raw = format!(
            "execution:\n  resolution: mutual_only\n  allow_draws: false\nblock_interval_ms: 250\ngenesis:\n  - public: \"{}\"\n    balance: 1000\n",
            hex(&alice.encode())
        );
        let config = SimulatorConfig::from_yaml(&raw).unwrap();
        assert_eq!(config.execution.resolution, ResolutionPolicy::MutualOnly);
        assert!(!config.execution.allow_draws);
        assert_eq!(
            config.execution.max_duration_secs,
            ExecutionConfig::default().max_duration_secs
        );
        assert_eq!(config.block_interval_ms, 250);
        assert_eq!(config.mempool_capacity, DEFAULT_MEMPOOL_CAPACITY);
        assert_eq!(config.max_backlog, DEFAULT_MAX_BACKLOG);
        assert_eq!(config.max_deferred_blocks, DEFAULT_MAX_DEFERRED_BLOCKS);
        assert_eq!(config.genesis_allocations().unwrap(), vec![(alice, 1000)]);
    }

    #[test]
    fn rejects_zero_interval() {
        let err = SimulatorConfig::from_yaml("block_interval_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("block_interval_ms"), "{err}");
    }

    #[test]
    fn rejects_zero_backlog_limits() {
        let err = SimulatorConfig::from_yaml("max_backlog: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_backlog"), "{err}");
        let err = SimulatorConfig::from_yaml("max_deferred_blocks: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_deferred_blocks"), "{err}");
    }

    #[test]
    fn rejects_bad_genesis_key() {
        let raw = "genesis:\n  - public: \"zz\"\n    balance: 1\n";
        assert!(SimulatorConfig::from_yaml(raw).is_err());
    }
}
