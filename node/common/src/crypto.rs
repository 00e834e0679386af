use crate::error::{KeeperError, Result};
use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, Signature, H256},
    utils::keccak256,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Compute SHA256 hash
pub fn sha256(data: &[u8]) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// SHA256 as lowercase hex without prefix
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data).as_bytes())
}

/// Keccak256 as `0x`-prefixed hex
pub fn keccak_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(data)))
}

/// Serialize with object keys sorted so signer and verifier hash the same bytes
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// EIP-191 personal-sign a payload, returning `0x`-prefixed hex
pub async fn sign_payload(wallet: &LocalWallet, payload: &[u8]) -> Result<String> {
    let signature = wallet
        .sign_message(payload)
        .await
        .map_err(|e| KeeperError::Signature(e.to_string()))?;
    Ok(format!("0x{}", signature))
}

/// Verify a personal-sign signature against the claimed signer address
pub fn verify_payload(payload: &[u8], signature: &str, address: &str) -> Result<()> {
    let signature = Signature::from_str(signature)
        .map_err(|e| KeeperError::Signature(format!("malformed signature: {}", e)))?;
    let address =
        Address::from_str(address).map_err(|_| KeeperError::InvalidAddress(address.to_string()))?;

    signature
        .verify(payload, address)
        .map_err(|e| KeeperError::Signature(format!("signature verification failed: {}", e)))
}
