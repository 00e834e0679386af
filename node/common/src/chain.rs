use crate::config::KeeperConfig;
use crate::error::{KeeperError, Result};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{Address, BlockId, BlockNumber, Bytes, Transaction, TransactionReceipt, H256, U256, U64},
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// The narrow query/submit surface the keeper needs from a chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn pending_nonce(&self, address: Address) -> Result<u64>;

    async fn suggest_gas_price(&self) -> Result<U256>;

    /// Broadcast a signed, RLP-encoded transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;

    async fn transaction_by_hash(&self, hash: H256) -> Result<Option<Transaction>>;

    async fn code_at(&self, address: Address) -> Result<Bytes>;

    async fn block_timestamp(&self, number: U64) -> Result<Option<U256>>;
}

/// JSON-RPC backed chain client
pub struct RpcChainClient {
    provider: Provider<Http>,
}

impl RpcChainClient {
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| KeeperError::Chain(format!("failed to connect to {}: {}", rpc_url, e)))?;
        Ok(Self { provider })
    }
}

fn rpc_err(e: impl std::fmt::Display) -> KeeperError {
    KeeperError::Chain(e.to_string())
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64> {
        let id = self.provider.get_chainid().await.map_err(rpc_err)?;
        Ok(id.as_u64())
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let nonce = self
            .provider
            .get_transaction_count(address, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(rpc_err)?;
        Ok(nonce.as_u64())
    }

    async fn suggest_gas_price(&self) -> Result<U256> {
        self.provider.get_gas_price().await.map_err(rpc_err)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = self.provider.send_raw_transaction(raw).await.map_err(rpc_err)?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        self.provider.get_transaction_receipt(hash).await.map_err(rpc_err)
    }

    async fn transaction_by_hash(&self, hash: H256) -> Result<Option<Transaction>> {
        self.provider.get_transaction(hash).await.map_err(rpc_err)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.provider.get_code(address, None).await.map_err(rpc_err)
    }

    async fn block_timestamp(&self, number: U64) -> Result<Option<U256>> {
        let block = self
            .provider
            .get_block(BlockId::Number(BlockNumber::Number(number)))
            .await
            .map_err(rpc_err)?;
        Ok(block.map(|b| b.timestamp))
    }
}

/// Lazily built chain clients keyed by chain id
pub struct ChainRegistry {
    rpc_urls: HashMap<String, String>,
    execution_contracts: HashMap<String, String>,
    clients: RwLock<HashMap<String, Arc<dyn ChainClient>>>,
}

impl ChainRegistry {
    pub fn new(config: &KeeperConfig) -> Self {
        let mut rpc_urls = HashMap::new();
        let mut execution_contracts = HashMap::new();
        for (chain_id, chain) in &config.chains {
            rpc_urls.insert(chain_id.clone(), chain.rpc_url.clone());
            execution_contracts.insert(chain_id.clone(), chain.execution_contract.clone());
        }

        Self {
            rpc_urls,
            execution_contracts,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with no configured endpoints; clients must be inserted
    pub fn empty() -> Self {
        Self {
            rpc_urls: HashMap::new(),
            execution_contracts: HashMap::new(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, chain_id: &str, client: Arc<dyn ChainClient>) {
        self.clients.write().await.insert(chain_id.to_string(), client);
    }

    pub fn set_execution_contract(&mut self, chain_id: &str, address: &str) {
        self.execution_contracts
            .insert(chain_id.to_string(), address.to_string());
    }

    /// Get or create the client for a chain
    pub async fn client(&self, chain_id: &str) -> Result<Arc<dyn ChainClient>> {
        if let Some(client) = self.clients.read().await.get(chain_id) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;

        // Another task may have connected while we waited for the write lock
        if let Some(client) = clients.get(chain_id) {
            return Ok(client.clone());
        }

        let rpc_url = self
            .rpc_urls
            .get(chain_id)
            .ok_or_else(|| KeeperError::UnknownChain(chain_id.to_string()))?;
        let client: Arc<dyn ChainClient> = Arc::new(RpcChainClient::connect(rpc_url)?);
        debug!(chain_id, rpc_url = %rpc_url, "Connected to chain");

        clients.insert(chain_id.to_string(), client.clone());
        Ok(client)
    }

    pub fn execution_contract(&self, chain_id: &str) -> Result<Address> {
        let raw = self
            .execution_contracts
            .get(chain_id)
            .ok_or_else(|| KeeperError::UnknownChain(chain_id.to_string()))?;
        Address::from_str(raw).map_err(|_| KeeperError::InvalidAddress(raw.clone()))
    }
}
