//! In-memory chain used by tests across the workspace

use crate::chain::ChainClient;
use crate::error::{KeeperError, Result};
use async_trait::async_trait;
use ethers::{
    types::{Address, Bytes, Log, Transaction, TransactionReceipt, H256, U256, U64},
    utils::{keccak256, rlp},
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// How broadcast transactions are mined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mining {
    /// Successful receipt on broadcast
    Success,
    /// Reverted receipt on broadcast
    Revert,
    /// No receipt until `mine` is called
    Manual,
}

#[derive(Debug, Clone)]
pub struct SentTransaction {
    pub hash: H256,
    pub nonce: u64,
    pub gas_price: U256,
    pub to: Option<Address>,
    pub data: Bytes,
}

struct ChainState {
    chain_id: u64,
    pending_nonce: u64,
    gas_price: U256,
    mining: Mining,
    block_number: u64,
    sent: Vec<SentTransaction>,
    send_errors: VecDeque<String>,
    receipt_errors: VecDeque<String>,
    receipts: HashMap<H256, TransactionReceipt>,
    transactions: HashMap<H256, Transaction>,
    code: HashMap<Address, Bytes>,
    block_timestamps: HashMap<u64, U256>,
}

pub struct MemoryChain {
    state: Mutex<ChainState>,
}

impl MemoryChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                chain_id,
                pending_nonce: 0,
                gas_price: U256::from(1_000_000_000u64),
                mining: Mining::Success,
                block_number: 0,
                sent: Vec::new(),
                send_errors: VecDeque::new(),
                receipt_errors: VecDeque::new(),
                receipts: HashMap::new(),
                transactions: HashMap::new(),
                code: HashMap::new(),
                block_timestamps: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_mining(&self, mining: Mining) {
        self.state().mining = mining;
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        self.state().pending_nonce = nonce;
    }

    pub fn set_gas_price(&self, price: impl Into<U256>) {
        self.state().gas_price = price.into();
    }

    /// Fail the next broadcast with this error text
    pub fn push_send_error(&self, message: impl Into<String>) {
        self.state().send_errors.push_back(message.into());
    }

    /// Fail the next receipt lookup with this error text
    pub fn push_receipt_error(&self, message: impl Into<String>) {
        self.state().receipt_errors.push_back(message.into());
    }

    pub fn set_code(&self, address: Address, code: impl Into<Bytes>) {
        self.state().code.insert(address, code.into());
    }

    pub fn set_block_timestamp(&self, block: u64, timestamp: u64) {
        self.state().block_timestamps.insert(block, U256::from(timestamp));
    }

    pub fn insert_receipt(&self, receipt: TransactionReceipt) {
        self.state().receipts.insert(receipt.transaction_hash, receipt);
    }

    pub fn insert_transaction(&self, transaction: Transaction) {
        self.state().transactions.insert(transaction.hash, transaction);
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }

    /// Mine a broadcast transaction
    pub fn mine(&self, hash: H256, success: bool) {
        let mut state = self.state();
        mine_locked(&mut state, hash, success);
    }

    /// Mine every broadcast transaction still without a receipt
    pub fn mine_all(&self, success: bool) {
        let mut state = self.state();
        let unmined: Vec<H256> = state
            .sent
            .iter()
            .map(|tx| tx.hash)
            .filter(|hash| !state.receipts.contains_key(hash))
            .collect();
        for hash in unmined {
            mine_locked(&mut state, hash, success);
        }
    }
}

fn mine_locked(state: &mut ChainState, hash: H256, success: bool) {
    state.block_number += 1;
    let block = state.block_number;
    let to = state.transactions.get(&hash).and_then(|tx| tx.to);

    state.receipts.insert(hash, receipt(hash, to, block, success));
    if let Some(tx) = state.transactions.get_mut(&hash) {
        tx.block_number = Some(U64::from(block));
    }
}

/// Receipt with the given outcome, logged by `to`
pub fn receipt(hash: H256, to: Option<Address>, block: u64, success: bool) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        block_number: Some(U64::from(block)),
        status: Some(U64::from(u64::from(success))),
        gas_used: Some(U256::from(21_000u64)),
        to,
        logs: to
            .map(|address| {
                vec![Log {
                    address,
                    ..Default::default()
                }]
            })
            .unwrap_or_default(),
        ..Default::default()
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.state().chain_id)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64> {
        Ok(self.state().pending_nonce)
    }

    async fn suggest_gas_price(&self) -> Result<U256> {
        Ok(self.state().gas_price)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let mut state = self.state();
        if let Some(message) = state.send_errors.pop_front() {
            return Err(KeeperError::Chain(message));
        }

        let transaction: Transaction = rlp::decode(raw.as_ref())
            .map_err(|e| KeeperError::Chain(format!("invalid raw transaction: {}", e)))?;
        let hash = H256::from(keccak256(raw.as_ref()));
        if state.transactions.contains_key(&hash) {
            return Err(KeeperError::Chain("already known".to_string()));
        }
        let nonce = transaction.nonce.as_u64();

        state.sent.push(SentTransaction {
            hash,
            nonce,
            gas_price: transaction.gas_price.unwrap_or_default(),
            to: transaction.to,
            data: transaction.input.clone(),
        });
        state.pending_nonce = state.pending_nonce.max(nonce + 1);
        state.transactions.insert(hash, Transaction { hash, ..transaction });

        match state.mining {
            Mining::Success => mine_locked(&mut state, hash, true),
            Mining::Revert => mine_locked(&mut state, hash, false),
            Mining::Manual => {}
        }

        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        let mut state = self.state();
        if let Some(message) = state.receipt_errors.pop_front() {
            return Err(KeeperError::Chain(message));
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn transaction_by_hash(&self, hash: H256) -> Result<Option<Transaction>> {
        Ok(self.state().transactions.get(&hash).cloned())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        Ok(self.state().code.get(&address).cloned().unwrap_or_default())
    }

    async fn block_timestamp(&self, number: U64) -> Result<Option<U256>> {
        Ok(self.state().block_timestamps.get(&number.as_u64()).copied())
    }
}
