//! Nonce allocation and transaction delivery for one account on one chain

use ethers::{
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt,
        TransactionRequest, H256, U256,
    },
    utils::keccak256,
};
use keeper_common::{chain::ChainClient, config::NonceSettings, KeeperError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

const NONCE_CONFLICTS: [&str; 3] = [
    "nonce too low",
    "replacement transaction underpriced",
    "already known",
];

#[derive(Error, Debug)]
pub enum NonceError {
    #[error("failed to sync nonce with chain: {0}")]
    Sync(#[source] KeeperError),

    #[error("failed to get gas price: {0}")]
    GasPrice(#[source] KeeperError),

    #[error("failed to sign transaction: {0}")]
    Signing(String),

    #[error("no tracked transaction for nonce {0}")]
    Untracked(u64),

    #[error("failed to wait for transaction {hash:?}: {source}")]
    Wait {
        hash: H256,
        #[source]
        source: KeeperError,
    },

    #[error("transaction with nonce {nonce} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        nonce: u64,
        attempts: u32,
        last_error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// In-flight transaction state for one nonce
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub nonce: u64,
    pub tx_hash: H256,
    /// Every hash broadcast for this nonce, oldest first
    pub hashes: Vec<H256>,
    pub created_at: Instant,
    pub status: TxStatus,
    pub attempts: u32,
    pub last_gas_price: U256,
    pub original_gas_price: U256,
    pub to: Address,
    pub data: Bytes,
    pub chain_id: u64,
    pub signer: LocalWallet,
}

#[derive(Debug)]
enum WaitError {
    Timeout,
    Chain(H256, KeeperError),
}

struct NonceCounter {
    current: u64,
    last_sync: Option<Instant>,
}

pub struct NonceManager {
    client: Arc<dyn ChainClient>,
    address: Address,
    settings: NonceSettings,
    counter: Mutex<NonceCounter>,
    pending: RwLock<HashMap<u64, PendingTransaction>>,
}

/// Whether a broadcast error means our view of the account nonce is stale
pub fn is_nonce_conflict(message: &str) -> bool {
    let message = message.to_lowercase();
    NONCE_CONFLICTS.iter().any(|pattern| message.contains(pattern))
}

/// `original × (120 + 20×attempt) / 100`, never below `last + 1`
pub fn replacement_gas_price(original: U256, last: U256, attempt: u32) -> U256 {
    let bumped = original * U256::from(120 + 20 * attempt as u64) / U256::from(100u64);
    bumped.max(last + U256::one())
}

impl NonceManager {
    pub fn new(client: Arc<dyn ChainClient>, address: Address, settings: NonceSettings) -> Self {
        Self {
            client,
            address,
            settings,
            counter: Mutex::new(NonceCounter {
                current: 0,
                last_sync: None,
            }),
            pending: RwLock::new(HashMap::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Seed the counter from the chain's pending nonce
    pub async fn initialize(&self) -> Result<(), NonceError> {
        let mut counter = self.counter.lock().await;
        self.sync_locked(&mut counter).await
    }

    /// Allocate the next nonce, re-syncing when the last sync is stale
    pub async fn get_next_nonce(&self) -> Result<u64, NonceError> {
        let mut counter = self.counter.lock().await;

        let stale = counter
            .last_sync
            .map_or(true, |at| at.elapsed() > self.settings.sync_interval());
        if stale {
            self.sync_locked(&mut counter).await?;
        }

        let nonce = counter.current;
        counter.current += 1;

        debug!(nonce, "Allocated nonce");
        Ok(nonce)
    }

    async fn resync(&self) -> Result<(), NonceError> {
        let mut counter = self.counter.lock().await;
        self.sync_locked(&mut counter).await
    }

    async fn sync_locked(&self, counter: &mut NonceCounter) -> Result<(), NonceError> {
        let chain_nonce = self
            .client
            .pending_nonce(self.address)
            .await
            .map_err(NonceError::Sync)?;

        if chain_nonce > counter.current {
            counter.current = chain_nonce;
            info!(nonce = chain_nonce, "Synced nonce with chain");
        }
        counter.last_sync = Some(Instant::now());
        Ok(())
    }

    /// Snapshot of the tracked transaction for a nonce
    pub async fn transaction(&self, nonce: u64) -> Option<PendingTransaction> {
        self.pending.read().await.get(&nonce).cloned()
    }

    /// Drop settled entries older than the retention period
    pub async fn prune_settled(&self) -> usize {
        let retention = self.settings.retention();
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, tx| tx.status == TxStatus::Pending || tx.created_at.elapsed() <= retention);
        let removed = before - pending.len();
        if removed > 0 {
            debug!(removed, "Pruned settled transactions");
        }
        removed
    }

    /// Deliver `data` to `to` using `nonce`, returning the mined receipt.
    ///
    /// A reverted receipt is returned as-is and the entry is marked failed.
    pub async fn submit_transaction(
        &self,
        nonce: u64,
        to: Address,
        data: Bytes,
        chain_id: u64,
        signer: &LocalWallet,
    ) -> Result<TransactionReceipt, NonceError> {
        self.prune_settled().await;

        // Reserve the nonce before any await so concurrent callers wait on this broadcast
        let existing = {
            let mut pending = self.pending.write().await;
            let existing = pending
                .get(&nonce)
                .filter(|tx| tx.status == TxStatus::Pending)
                .cloned();
            if existing.is_none() {
                pending.insert(
                    nonce,
                    PendingTransaction {
                        nonce,
                        tx_hash: H256::zero(),
                        hashes: Vec::new(),
                        created_at: Instant::now(),
                        status: TxStatus::Pending,
                        attempts: 0,
                        last_gas_price: U256::zero(),
                        original_gas_price: U256::zero(),
                        to,
                        data: data.clone(),
                        chain_id,
                        signer: signer.clone(),
                    },
                );
            }
            existing
        };

        if let Some(existing) = existing {
            let age = existing.created_at.elapsed();
            let stuck_after = self.settings.stuck_after();

            if age > stuck_after {
                info!(nonce, tx_hash = ?existing.tx_hash, "Replacing stuck transaction");
                return self.replace_and_retry(nonce, existing.attempts).await;
            }

            info!(nonce, tx_hash = ?existing.tx_hash, "Waiting for existing transaction");
            return match self.wait_for_receipt(nonce, stuck_after - age).await {
                Ok(receipt) => Ok(self.settle(nonce, receipt).await),
                Err(WaitError::Timeout) => {
                    warn!(nonce, "Existing transaction is stuck, replacing");
                    self.replace_and_retry(nonce, existing.attempts).await
                }
                Err(WaitError::Chain(hash, source)) => Err(NonceError::Wait { hash, source }),
            };
        }

        let signed = async {
            let gas_price = self.optimal_gas_price().await?;
            let (raw, hash) = self.sign(signer, chain_id, nonce, to, &data, gas_price)?;
            Ok::<_, NonceError>((raw, hash, gas_price))
        }
        .await;

        let (raw, hash, gas_price) = match signed {
            Ok(signed) => signed,
            Err(e) => {
                self.pending.write().await.remove(&nonce);
                return Err(e);
            }
        };

        if let Some(tx) = self.pending.write().await.get_mut(&nonce) {
            tx.tx_hash = hash;
            tx.hashes = vec![hash];
            tx.created_at = Instant::now();
            tx.attempts = 1;
            tx.last_gas_price = gas_price;
            tx.original_gas_price = gas_price;
        }

        self.submit_with_retry(nonce, raw).await
    }

    async fn replace_and_retry(&self, nonce: u64, attempt: u32) -> Result<TransactionReceipt, NonceError> {
        let raw = self.build_replacement(nonce, attempt).await?;
        self.submit_with_retry(nonce, raw).await
    }

    async fn submit_with_retry(&self, nonce: u64, mut raw: Bytes) -> Result<TransactionReceipt, NonceError> {
        let max_retries = self.settings.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_retries {
            match self.client.send_raw_transaction(raw.clone()).await {
                Ok(hash) => info!(nonce, attempt, tx_hash = ?hash, "Transaction sent"),
                Err(e) => {
                    let message = e.to_string();
                    warn!(nonce, attempt, error = %message, "Failed to broadcast transaction");
                    last_error = message.clone();
                    if !is_nonce_conflict(&message) {
                        continue;
                    }

                    self.resync().await?;

                    // An earlier broadcast of this nonce may already be pooled or mined
                    let wait = self.settings.base_timeout() * 2u32.saturating_pow(attempt);
                    match self.wait_for_receipt(nonce, wait).await {
                        Ok(receipt) => return Ok(self.settle(nonce, receipt).await),
                        Err(WaitError::Timeout) => {}
                        Err(WaitError::Chain(hash, e)) => {
                            warn!(nonce, attempt, tx_hash = ?hash, error = %e, "Failed to fetch receipt");
                        }
                    }
                    continue;
                }
            }

            let wait = self.settings.base_timeout() * 2u32.saturating_pow(attempt);
            match self.wait_for_receipt(nonce, wait).await {
                Ok(receipt) => return Ok(self.settle(nonce, receipt).await),
                Err(WaitError::Timeout) => {
                    warn!(nonce, attempt, timeout = ?wait, "Confirmation timed out");
                    last_error = format!("confirmation timed out after {:?}", wait);
                    if attempt + 1 < max_retries {
                        raw = self.build_replacement(nonce, attempt + 1).await?;
                    }
                }
                Err(WaitError::Chain(hash, e)) => {
                    warn!(nonce, attempt, tx_hash = ?hash, error = %e, "Failed to fetch receipt");
                    last_error = e.to_string();
                }
            }
        }

        if let Some(tx) = self.pending.write().await.get_mut(&nonce) {
            tx.status = TxStatus::Failed;
        }

        Err(NonceError::Exhausted {
            nonce,
            attempts: max_retries,
            last_error,
        })
    }

    /// Re-sign the tracked transaction at a higher gas price, same nonce, recipient and data
    async fn build_replacement(&self, nonce: u64, attempt: u32) -> Result<Bytes, NonceError> {
        let tracked = self
            .transaction(nonce)
            .await
            .filter(|tx| !tx.hashes.is_empty())
            .ok_or(NonceError::Untracked(nonce))?;

        let gas_price = replacement_gas_price(tracked.original_gas_price, tracked.last_gas_price, attempt);
        let (raw, hash) = self.sign(
            &tracked.signer,
            tracked.chain_id,
            nonce,
            tracked.to,
            &tracked.data,
            gas_price,
        )?;

        if let Some(tx) = self.pending.write().await.get_mut(&nonce) {
            tx.tx_hash = hash;
            tx.hashes.push(hash);
            tx.status = TxStatus::Pending;
            tx.attempts += 1;
            tx.last_gas_price = gas_price;
            tx.created_at = Instant::now();
        }

        info!(nonce, attempt, tx_hash = ?hash, gas_price = %gas_price, "Built replacement transaction");
        Ok(raw)
    }

    async fn settle(&self, nonce: u64, receipt: TransactionReceipt) -> TransactionReceipt {
        let success = receipt.status.map(|s| s.as_u64()) == Some(1);

        if let Some(tx) = self.pending.write().await.get_mut(&nonce) {
            tx.tx_hash = receipt.transaction_hash;
            tx.status = if success {
                TxStatus::Confirmed
            } else {
                TxStatus::Failed
            };
        }

        if success {
            info!(nonce, tx_hash = ?receipt.transaction_hash, "Transaction confirmed");
        } else {
            warn!(nonce, tx_hash = ?receipt.transaction_hash, "Transaction reverted");
        }
        receipt
    }

    /// Poll for a receipt of any hash broadcast for `nonce` until `limit` elapses
    async fn wait_for_receipt(&self, nonce: u64, limit: Duration) -> Result<TransactionReceipt, WaitError> {
        let poll = self.settings.receipt_poll();

        let result = timeout(limit, async {
            loop {
                let hashes = self.transaction(nonce).await.map(|tx| tx.hashes).unwrap_or_default();
                for hash in hashes.iter().rev() {
                    match self.client.transaction_receipt(*hash).await {
                        Ok(Some(receipt)) => return Ok(receipt),
                        Ok(None) => {}
                        Err(e) => return Err(WaitError::Chain(*hash, e)),
                    }
                }
                sleep(poll).await;
            }
        })
        .await;

        result.unwrap_or(Err(WaitError::Timeout))
    }

    async fn optimal_gas_price(&self) -> Result<U256, NonceError> {
        let suggested = self
            .client
            .suggest_gas_price()
            .await
            .map_err(NonceError::GasPrice)?;
        let price = suggested * U256::from(120u64) / U256::from(100u64);
        debug!(gas_price = %price, "Using legacy gas price");
        Ok(price)
    }

    fn sign(
        &self,
        signer: &LocalWallet,
        chain_id: u64,
        nonce: u64,
        to: Address,
        data: &Bytes,
        gas_price: U256,
    ) -> Result<(Bytes, H256), NonceError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(signer.address())
            .to(to)
            .value(0)
            .gas(self.settings.gas_limit)
            .gas_price(gas_price)
            .nonce(nonce)
            .data(data.clone())
            .chain_id(chain_id)
            .into();

        let signature = signer
            .sign_transaction_sync(&tx)
            .map_err(|e| NonceError::Signing(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));
        Ok((raw, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_common::testing::{MemoryChain, Mining};

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet() -> LocalWallet {
        KEY.parse().unwrap()
    }

    fn manager(chain: &Arc<MemoryChain>) -> NonceManager {
        NonceManager::new(chain.clone(), wallet().address(), NonceSettings::default())
    }

    fn target() -> Address {
        Address::from_low_u64_be(0xbeef)
    }

    #[test]
    fn nonce_conflict_patterns() {
        let cases = [
            ("chain RPC error: nonce too low", true),
            ("Replacement transaction underpriced", true),
            ("already known", true),
            ("connection refused", false),
            ("insufficient funds for gas", false),
        ];
        for (message, expected) in cases {
            assert_eq!(is_nonce_conflict(message), expected, "{}", message);
        }
    }

    #[test]
    fn replacement_price_grows_per_attempt() {
        let original = U256::from(100u64);
        assert_eq!(replacement_gas_price(original, original, 1), U256::from(140u64));
        assert_eq!(replacement_gas_price(original, original, 2), U256::from(160u64));
        assert_eq!(replacement_gas_price(original, U256::from(500u64), 1), U256::from(501u64));
        assert_eq!(replacement_gas_price(U256::zero(), U256::zero(), 1), U256::one());
    }

    #[tokio::test(start_paused = true)]
    async fn allocates_strictly_increasing_nonces() {
        let chain = Arc::new(MemoryChain::new(1));
        chain.set_pending_nonce(7);
        let manager = manager(&chain);
        manager.initialize().await.unwrap();

        let mut nonces = Vec::new();
        for _ in 0..5 {
            nonces.push(manager.get_next_nonce().await.unwrap());
        }
        assert_eq!(nonces, vec![7, 8, 9, 10, 11]);
    }

    #[tokio::test(start_paused = true)]
    async fn resync_never_regresses() {
        let chain = Arc::new(MemoryChain::new(1));
        chain.set_pending_nonce(3);
        let manager = manager(&chain);

        assert_eq!(manager.get_next_nonce().await.unwrap(), 3);
        assert_eq!(manager.get_next_nonce().await.unwrap(), 4);

        chain.set_pending_nonce(1);
        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(manager.get_next_nonce().await.unwrap(), 5);

        chain.set_pending_nonce(20);
        assert_eq!(manager.get_next_nonce().await.unwrap(), 6);

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(manager.get_next_nonce().await.unwrap(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn submits_with_buffered_gas_price() {
        let chain = Arc::new(MemoryChain::new(31337));
        let manager = manager(&chain);

        let receipt = manager
            .submit_transaction(0, target(), Bytes::from(vec![1, 2, 3]), 31337, &wallet())
            .await
            .unwrap();

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].gas_price, U256::from(1_200_000_000u64));
        assert_eq!(sent[0].to, Some(target()));
        assert_eq!(sent[0].data, Bytes::from(vec![1, 2, 3]));
        assert_eq!(receipt.transaction_hash, sent[0].hash);

        let tracked = manager.transaction(0).await.unwrap();
        assert_eq!(tracked.status, TxStatus::Confirmed);
        assert_eq!(tracked.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_receipt_marks_failed() {
        let chain = Arc::new(MemoryChain::new(1));
        chain.set_mining(Mining::Revert);
        let manager = manager(&chain);

        let receipt = manager
            .submit_transaction(0, target(), Bytes::new(), 1, &wallet())
            .await
            .unwrap();
        assert_eq!(receipt.status.map(|s| s.as_u64()), Some(0));
        assert_eq!(manager.transaction(0).await.unwrap().status, TxStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn young_pending_nonce_is_not_rebroadcast() {
        let chain = Arc::new(MemoryChain::new(1));
        chain.set_mining(Mining::Manual);
        let manager = Arc::new(manager(&chain));

        let first = tokio::spawn({
            let manager = manager.clone();
            async move {
                manager
                    .submit_transaction(0, target(), Bytes::from(vec![1]), 1, &wallet())
                    .await
            }
        });
        sleep(Duration::from_millis(100)).await;
        assert_eq!(chain.sent_count(), 1);

        let second = tokio::spawn({
            let manager = manager.clone();
            async move {
                manager
                    .submit_transaction(0, target(), Bytes::from(vec![2]), 1, &wallet())
                    .await
            }
        });
        sleep(Duration::from_millis(100)).await;
        chain.mine_all(true);

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(chain.sent_count(), 1);
        assert_eq!(first.transaction_hash, second.transaction_hash);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_pending_nonce_is_replaced_with_higher_fee() {
        let chain = Arc::new(MemoryChain::new(1));
        chain.set_mining(Mining::Manual);
        let manager = Arc::new(manager(&chain));

        // The worker that broadcast the original goes away without settling it
        let abandoned = tokio::spawn({
            let manager = manager.clone();
            async move {
                manager
                    .submit_transaction(4, target(), Bytes::from(vec![0xaa]), 1, &wallet())
                    .await
            }
        });
        sleep(Duration::from_millis(100)).await;
        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());
        assert_eq!(chain.sent_count(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        chain.set_mining(Mining::Success);

        let receipt = manager
            .submit_transaction(4, Address::zero(), Bytes::from(vec![0xbb]), 1, &wallet())
            .await
            .unwrap();

        let sent = chain.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].nonce, sent[0].nonce);
        assert_eq!(sent[1].to, sent[0].to);
        assert_eq!(sent[1].data, Bytes::from(vec![0xaa]));
        assert!(sent[1].gas_price > sent[0].gas_price);
        assert_eq!(receipt.transaction_hash, sent[1].hash);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_timeout_replaces_and_confirms() {
        let chain = Arc::new(MemoryChain::new(1));
        chain.set_mining(Mining::Manual);
        let manager = Arc::new(manager(&chain));

        let submit = tokio::spawn({
            let manager = manager.clone();
            async move {
                manager
                    .submit_transaction(0, target(), Bytes::from(vec![9]), 1, &wallet())
                    .await
            }
        });

        // First wait is 5s; the replacement goes out right after it
        sleep(Duration::from_secs(6)).await;
        let sent = chain.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].gas_price, sent[0].gas_price * U256::from(140u64) / U256::from(100u64));

        chain.mine(sent[1].hash, true);
        let receipt = submit.await.unwrap().unwrap();
        assert_eq!(receipt.transaction_hash, sent[1].hash);

        let tracked = manager.transaction(0).await.unwrap();
        assert_eq!(tracked.attempts, 2);
        assert_eq!(tracked.hashes, vec![sent[0].hash, sent[1].hash]);
        assert_eq!(tracked.status, TxStatus::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn nonce_conflict_forces_resync() {
        let chain = Arc::new(MemoryChain::new(1));
        let manager = manager(&chain);
        manager.initialize().await.unwrap();

        chain.set_pending_nonce(50);
        chain.push_send_error("nonce too low");

        manager
            .submit_transaction(0, target(), Bytes::new(), 1, &wallet())
            .await
            .unwrap();
        assert_eq!(chain.sent_count(), 1);
        assert_eq!(manager.get_next_nonce().await.unwrap(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn rebroadcast_conflict_finds_mined_transaction() {
        let chain = Arc::new(MemoryChain::new(1));
        chain.push_receipt_error("connection reset by peer");
        let manager = manager(&chain);

        // First receipt lookup fails, the resend is rejected as already known
        let receipt = manager
            .submit_transaction(0, target(), Bytes::from(vec![5]), 1, &wallet())
            .await
            .unwrap();

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(receipt.transaction_hash, sent[0].hash);
        assert_eq!(manager.transaction(0).await.unwrap().status, TxStatus::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_submits_share_one_broadcast() {
        let chain = Arc::new(MemoryChain::new(1));
        chain.set_mining(Mining::Manual);
        let manager = Arc::new(manager(&chain));

        let submits: Vec<_> = (0..2u8)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .submit_transaction(3, target(), Bytes::from(vec![i]), 1, &wallet())
                        .await
                })
            })
            .collect();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(chain.sent_count(), 1);
        chain.mine_all(true);

        let mut hashes = Vec::new();
        for submit in submits {
            hashes.push(submit.await.unwrap().unwrap().transaction_hash);
        }
        assert_eq!(chain.sent_count(), 1);
        assert_eq!(hashes[0], hashes[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_are_terminal() {
        let chain = Arc::new(MemoryChain::new(1));
        for _ in 0..5 {
            chain.push_send_error("connection refused");
        }
        let manager = manager(&chain);

        let err = manager
            .submit_transaction(2, target(), Bytes::new(), 1, &wallet())
            .await
            .unwrap_err();
        assert!(matches!(err, NonceError::Exhausted { nonce: 2, attempts: 5, .. }));
        assert_eq!(manager.transaction(2).await.unwrap().status, TxStatus::Failed);
        assert_eq!(chain.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_entries_are_pruned_after_retention() {
        let chain = Arc::new(MemoryChain::new(1));
        let manager = manager(&chain);

        manager
            .submit_transaction(0, target(), Bytes::new(), 1, &wallet())
            .await
            .unwrap();
        assert_eq!(manager.prune_settled().await, 0);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(manager.prune_settled().await, 1);
        assert!(manager.transaction(0).await.is_none());
    }
}
