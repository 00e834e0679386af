//! Custom script tasks: the script decides whether to execute and supplies the call itself

use crate::sandbox::{ScriptOutcome, ScriptRequest, ScriptRunner};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use keeper_common::{
    crypto::{keccak_hex, sha256_hex, sign_payload},
    types::{StorageUpdates, TaskTargetData},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

const STORAGE_SET_PREFIX: &str = "STORAGE_SET:";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutputError {
    #[error("targetContract required when shouldExecute=true")]
    MissingTarget,

    #[error("calldata required when shouldExecute=true")]
    MissingCalldata,

    #[error("invalid targetContract address format")]
    InvalidTarget,

    #[error("calldata must be hex string starting with 0x")]
    InvalidCalldata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptMetadata {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub gas_estimate: u64,
}

/// JSON object a custom script prints on stdout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomScriptOutput {
    #[serde(default)]
    pub should_execute: bool,
    #[serde(default)]
    pub target_contract: String,
    #[serde(default)]
    pub calldata: String,
    #[serde(default)]
    pub storage_updates: Option<StorageUpdates>,
    #[serde(default)]
    pub metadata: ScriptMetadata,
}

impl CustomScriptOutput {
    pub fn validate(&self) -> Result<(), ScriptOutputError> {
        if !self.should_execute {
            return Ok(());
        }
        if self.target_contract.is_empty() {
            return Err(ScriptOutputError::MissingTarget);
        }
        if self.calldata.is_empty() {
            return Err(ScriptOutputError::MissingCalldata);
        }
        let is_address = self
            .target_contract
            .strip_prefix("0x")
            .map_or(false, |digits| {
                digits.len() == 40 && digits.bytes().all(|b| b.is_ascii_hexdigit())
            });
        if !is_address {
            return Err(ScriptOutputError::InvalidTarget);
        }
        if !self.calldata.starts_with("0x") {
            return Err(ScriptOutputError::InvalidCalldata);
        }
        Ok(())
    }
}

/// Signed record binding a custom script's inputs to its decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProof {
    pub execution_id: String,
    pub job_id: String,
    pub timestamp: i64,
    pub input_hash: String,
    pub output_hash: String,
    pub signature: String,
    pub performer_address: String,
}

/// Everything a custom script run produced
#[derive(Debug, Clone)]
pub struct CustomScriptRun {
    pub execution_id: String,
    pub output: CustomScriptOutput,
    pub storage_updates: StorageUpdates,
    pub script: ScriptOutcome,
    pub started_at: DateTime<Utc>,
}

/// `STORAGE_SET:key=value` lines from the script's stderr
pub fn parse_storage_updates(stderr: &str) -> StorageUpdates {
    stderr
        .lines()
        .filter_map(|line| line.trim().strip_prefix(STORAGE_SET_PREFIX))
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

pub fn execution_id(job_id: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("exec_{}_{}", job_id, &id[..8])
}

/// Sorted `key=value;` pairs hashed with SHA-256, or `0x0` when empty
pub fn hash_storage(storage: &StorageUpdates) -> String {
    if storage.is_empty() {
        return "0x0".to_string();
    }

    let data: String = storage
        .iter()
        .map(|(key, value)| format!("{}={};", key, value))
        .collect();
    format!("0x{}", sha256_hex(data.as_bytes()))
}

pub async fn generate_execution_proof(
    execution_id: &str,
    job_id: &str,
    storage: &StorageUpdates,
    output: &CustomScriptOutput,
    timestamp: DateTime<Utc>,
    wallet: &LocalWallet,
) -> Result<ExecutionProof> {
    let input = format!("{}:{}:{}", timestamp.timestamp(), job_id, hash_storage(storage));
    let input_hash = keccak_hex(input.as_bytes());

    let decision = format!(
        "{}:{}:{}",
        output.should_execute, output.target_contract, output.calldata
    );
    let output_hash = keccak_hex(decision.as_bytes());

    let signature = sign_payload(wallet, format!("{}{}", input_hash, output_hash).as_bytes()).await?;

    Ok(ExecutionProof {
        execution_id: execution_id.to_string(),
        job_id: job_id.to_string(),
        timestamp: timestamp.timestamp(),
        input_hash,
        output_hash,
        signature,
        performer_address: format!("{:?}", wallet.address()),
    })
}

/// Run a custom script and validate what it asks for
pub async fn run_custom_script(runner: &dyn ScriptRunner, target: &TaskTargetData) -> Result<CustomScriptRun> {
    let started_at = Utc::now();
    let execution_id = execution_id(&target.job_id);

    info!(
        job_id = %target.job_id,
        task_id = target.task_id,
        url = %target.dynamic_arguments_script_url,
        "Executing custom script"
    );

    let request = ScriptRequest {
        script_url: target.dynamic_arguments_script_url.clone(),
        language: target.script_language.clone().unwrap_or_default(),
        attester_count: 1,
        metadata: json!({
            "job_id": target.job_id,
            "task_id": target.task_id,
            "execution_id": execution_id,
            "timestamp": started_at.timestamp(),
        }),
    };

    let script = runner.run(&request).await.context("script execution failed")?;
    if !script.success {
        bail!(
            "script execution failed: {}",
            script.error.as_deref().unwrap_or("unknown error")
        );
    }

    let output: CustomScriptOutput =
        serde_json::from_str(script.output.trim()).context("failed to parse script output")?;
    output.validate().context("invalid script output")?;

    let mut storage_updates = output.storage_updates.clone().unwrap_or_default();
    storage_updates.extend(parse_storage_updates(&script.stderr));

    info!(
        job_id = %target.job_id,
        should_execute = output.should_execute,
        target = %output.target_contract,
        storage_updates = storage_updates.len(),
        "Custom script decided"
    );

    Ok(CustomScriptRun {
        execution_id,
        output,
        storage_updates,
        script,
        started_at,
    })
}
