//! Checks that a trigger really fired and that a peer's claimed execution is genuine.
//!
//! Every check returns `Ok(true)` when valid, `Ok(false)` when a trigger
//! condition simply did not hold, and `Err` with a readable reason otherwise.

mod action;
mod proof;
mod signature;
mod trigger;

use keeper_common::{
    chain::{ChainClient, ChainRegistry},
    proof::CertificateSource,
    types::IpfsData,
    KeeperError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub use trigger::{ConditionOperator, EVENT_TIME_TOLERANCE_MS};

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("expiration time is before trigger timestamp")]
    ExpiredBeforeTrigger,

    #[error("no contract found at address: {0}")]
    NoContract(String),

    #[error("transaction is pending")]
    TransactionPending,

    #[error("transaction is not successful")]
    TransactionFailed,

    #[error("transaction is not found")]
    TransactionNotFound,

    #[error("transaction was not made to correct target contract")]
    WrongTargetContract,

    #[error("event name is not correct")]
    WrongEventName,

    #[error("transaction was made after the expiration time (tx: {tx}, exp+tolerance: {limit})")]
    LateTransaction { tx: String, limit: String },

    #[error("invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("task data is missing")]
    MissingTaskData,

    #[error("action data is missing")]
    MissingActionData,

    #[error("scheduler signature data is missing")]
    MissingSchedulerSignature,

    #[error("scheduler signature is empty")]
    EmptySchedulerSignature,

    #[error("scheduler signing address is empty")]
    EmptySchedulerAddress,

    #[error("performer signature data is missing")]
    MissingPerformerSignature,

    #[error("performer signature is empty")]
    EmptyPerformerSignature,

    #[error("performer signing address is empty")]
    EmptyPerformerAddress,

    #[error("performer signing address does not match the assigned performer")]
    PerformerMismatch,

    #[error("signature verification failed: {0}")]
    BadSignature(String),

    #[error("proof data is missing")]
    MissingProof,

    #[error("proof of task is empty")]
    EmptyProofOfTask,

    #[error("certificate hash is empty")]
    EmptyCertificateHash,

    #[error("proof of task mismatch: claimed {claimed}, computed {computed}")]
    ProofMismatch { claimed: String, computed: String },

    #[error(transparent)]
    Keeper(#[from] KeeperError),
}

pub type ValidationResult = Result<bool, ValidationError>;

/// Stateless per call; shares only the chain registry
pub struct TaskValidator {
    registry: Arc<ChainRegistry>,
    certificates: Option<Arc<dyn CertificateSource>>,
}

impl TaskValidator {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self {
            registry,
            certificates: None,
        }
    }

    /// Re-fetch the proof certificate from this source during proof validation
    pub fn with_certificate_source(mut self, source: Arc<dyn CertificateSource>) -> Self {
        self.certificates = Some(source);
        self
    }

    async fn client(&self, chain_id: &str) -> Result<Arc<dyn ChainClient>, ValidationError> {
        Ok(self.registry.client(chain_id).await?)
    }

    /// Run every check on a published bundle
    pub async fn validate_task(&self, ipfs: &IpfsData) -> ValidationResult {
        let task = ipfs.task_data.as_ref().ok_or(ValidationError::MissingTaskData)?;
        let action = ipfs
            .action_data
            .as_ref()
            .ok_or(ValidationError::MissingActionData)?;

        self.validate_scheduler_signature(task)?;
        self.validate_performer_signature(ipfs)?;
        self.validate_proof(ipfs).await?;

        for (target, trigger) in task.target_data.iter().zip(&task.trigger_data) {
            if !self.validate_trigger(trigger).await? {
                warn!(task_id = trigger.task_id, "Trigger condition not satisfied");
                return Ok(false);
            }

            if target.task_id == action.task_id {
                self.validate_action(target, action).await?;
            }
        }

        info!(task_id = action.task_id, "Task bundle is valid");
        Ok(true)
    }
}
