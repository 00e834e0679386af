use crate::error::{KeeperError, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Keeper node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Chain id to RPC endpoint and execution contract
    pub chains: BTreeMap<String, ChainConfig>,

    /// Host whose certificate binds proofs to this keeper
    #[serde(default = "default_tls_proof_host")]
    pub tls_proof_host: String,

    #[serde(default = "default_tls_proof_port")]
    pub tls_proof_port: u16,

    #[serde(default)]
    pub nonce: NonceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,

    /// Forwarder contract that receives `executeFunction` calls
    pub execution_contract: String,
}

/// Nonce manager tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceSettings {
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    #[serde(default = "default_stuck_after_secs")]
    pub stuck_after_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_timeout_secs")]
    pub base_timeout_secs: u64,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,

    /// How long confirmed/failed entries stay in the pending table
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_tls_proof_host() -> String {
    "www.google.com".to_string()
}

fn default_tls_proof_port() -> u16 {
    443
}

fn default_sync_interval_secs() -> u64 {
    15
}

fn default_stuck_after_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_timeout_secs() -> u64 {
    5
}

fn default_gas_limit() -> u64 {
    300_000
}

fn default_receipt_poll_ms() -> u64 {
    500
}

fn default_retention_secs() -> u64 {
    600
}

impl Default for NonceSettings {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            stuck_after_secs: default_stuck_after_secs(),
            max_retries: default_max_retries(),
            base_timeout_secs: default_base_timeout_secs(),
            gas_limit: default_gas_limit(),
            receipt_poll_ms: default_receipt_poll_ms(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl NonceSettings {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.stuck_after_secs)
    }

    pub fn base_timeout(&self) -> Duration {
        Duration::from_secs(self.base_timeout_secs)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl KeeperConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(KeeperError::Config("at least one chain must be configured".into()));
        }

        for (chain_id, chain) in &self.chains {
            if !chain.rpc_url.starts_with("http://") && !chain.rpc_url.starts_with("https://") {
                return Err(KeeperError::Config(format!(
                    "chain {}: rpc_url must be an http(s) URL",
                    chain_id
                )));
            }
            Address::from_str(&chain.execution_contract).map_err(|_| {
                KeeperError::Config(format!(
                    "chain {}: invalid execution_contract {}",
                    chain_id, chain.execution_contract
                ))
            })?;
        }

        if self.tls_proof_host.is_empty() {
            return Err(KeeperError::Config("tls_proof_host cannot be empty".into()));
        }

        if self.nonce.max_retries == 0 {
            return Err(KeeperError::Config("nonce.max_retries must be at least 1".into()));
        }

        Ok(())
    }
}
