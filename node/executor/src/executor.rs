use crate::convert::ArgumentConverter;
use crate::custom::{generate_execution_proof, run_custom_script, ExecutionProof};
use crate::nonce::NonceManager;
use crate::sandbox::ScriptRunner;
use anyhow::{bail, Context, Result};
use ethers::{
    signers::{LocalWallet, Signer},
    types::Address,
};
use keeper_common::{
    chain::ChainRegistry,
    config::NonceSettings,
    crypto::{canonical_json, sign_payload},
    proof::{generate_proof, CertificateSource},
    types::{IpfsData, KeeperTask, PerformerActionData, PerformerSignatureData, StorageUpdates},
};
use keeper_validator::TaskValidator;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Result of one target/trigger pair
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Executed {
        task_id: i64,
        bundle: Box<IpfsData>,
        #[serde(skip_serializing_if = "StorageUpdates::is_empty")]
        storage_updates: StorageUpdates,
        #[serde(skip_serializing_if = "Option::is_none")]
        execution_proof: Option<ExecutionProof>,
    },
    Skipped {
        task_id: i64,
        reason: String,
        #[serde(skip_serializing_if = "StorageUpdates::is_empty")]
        storage_updates: StorageUpdates,
        #[serde(skip_serializing_if = "Option::is_none")]
        execution_proof: Option<ExecutionProof>,
    },
    Failed {
        task_id: i64,
        error: String,
    },
}

impl TaskOutcome {
    pub fn task_id(&self) -> i64 {
        match self {
            Self::Executed { task_id, .. }
            | Self::Skipped { task_id, .. }
            | Self::Failed { task_id, .. } => *task_id,
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Keeper node side of the task lifecycle
pub struct TaskExecutor {
    pub(crate) registry: Arc<ChainRegistry>,
    validator: TaskValidator,
    pub(crate) runner: Arc<dyn ScriptRunner>,
    certificates: Arc<dyn CertificateSource>,
    pub(crate) wallet: LocalWallet,
    nonce_settings: NonceSettings,
    nonce_managers: RwLock<HashMap<String, Arc<NonceManager>>>,
    pub(crate) converter: ArgumentConverter,
}

impl TaskExecutor {
    pub fn new(
        registry: Arc<ChainRegistry>,
        runner: Arc<dyn ScriptRunner>,
        certificates: Arc<dyn CertificateSource>,
        wallet: LocalWallet,
        nonce_settings: NonceSettings,
    ) -> Self {
        Self {
            validator: TaskValidator::new(registry.clone()),
            registry,
            runner,
            certificates,
            wallet,
            nonce_settings,
            nonce_managers: RwLock::new(HashMap::new()),
            converter: ArgumentConverter::new(),
        }
    }

    /// Fail on missing struct fields instead of zero-filling them
    pub fn with_strict_arguments(mut self) -> Self {
        self.converter = ArgumentConverter::strict();
        self
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Get or create the nonce manager for a chain
    pub(crate) async fn nonce_manager(&self, chain_id: &str) -> Result<Arc<NonceManager>> {
        if let Some(manager) = self.nonce_managers.read().await.get(chain_id) {
            return Ok(manager.clone());
        }

        let mut managers = self.nonce_managers.write().await;
        if let Some(manager) = managers.get(chain_id) {
            return Ok(manager.clone());
        }

        let client = self.registry.client(chain_id).await?;
        let manager = Arc::new(NonceManager::new(
            client,
            self.address(),
            self.nonce_settings.clone(),
        ));
        manager
            .initialize()
            .await
            .with_context(|| format!("failed to initialize nonce manager for chain {}", chain_id))?;
        debug!(chain_id, "Created nonce manager");

        managers.insert(chain_id.to_string(), manager.clone());
        Ok(manager)
    }

    /// Run every target/trigger pair of a dispatched task on its own worker.
    ///
    /// A failing pair yields `TaskOutcome::Failed` without stopping the others.
    pub async fn execute_task(self: &Arc<Self>, task: KeeperTask) -> Result<Vec<TaskOutcome>> {
        info!(task_ids = ?task.task_id, "Received task");

        self.validator
            .validate_scheduler_signature(&task)
            .context("scheduler signature validation failed")?;

        if task.target_data.len() != task.trigger_data.len() {
            bail!(
                "task has {} targets but {} triggers",
                task.target_data.len(),
                task.trigger_data.len()
            );
        }

        let task = Arc::new(task);
        let mut workers = JoinSet::new();
        for index in 0..task.target_data.len() {
            let executor = Arc::clone(self);
            let task = Arc::clone(&task);
            workers.spawn(async move { (index, executor.execute_pair(&task, index).await) });
        }

        // Every worker runs to completion so confirmed transactions are always reported
        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; task.target_data.len()];
        while let Some(joined) = workers.join_next().await {
            let (index, outcome) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    error!(error = %e, "Task worker stopped unexpectedly");
                    continue;
                }
            };
            let task_id = task.target_data[index].task_id;
            outcomes[index] = Some(match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = format!("{:#}", e);
                    error!(task_id, error = %error, "Task failed");
                    TaskOutcome::Failed { task_id, error }
                }
            });
        }

        Ok(outcomes
            .into_iter()
            .zip(&task.target_data)
            .map(|(outcome, target)| {
                outcome.unwrap_or_else(|| TaskOutcome::Failed {
                    task_id: target.task_id,
                    error: "task worker stopped unexpectedly".to_string(),
                })
            })
            .collect())
    }

    async fn execute_pair(&self, task: &KeeperTask, index: usize) -> Result<TaskOutcome> {
        let target = &task.target_data[index];
        let trigger = &task.trigger_data[index];

        let satisfied = self
            .validator
            .validate_trigger(trigger)
            .await
            .context("trigger validation failed")?;
        if !satisfied {
            warn!(task_id = target.task_id, "Trigger not satisfied, skipping");
            return Ok(TaskOutcome::Skipped {
                task_id: target.task_id,
                reason: "trigger condition not satisfied".to_string(),
                storage_updates: StorageUpdates::new(),
                execution_proof: None,
            });
        }

        if target.task_definition_id.is_custom_script() {
            return self.execute_custom(task, index).await;
        }

        let action = self.execute_action(target, trigger).await?;
        let bundle = self.publish(task, action).await?;

        Ok(TaskOutcome::Executed {
            task_id: target.task_id,
            bundle: Box::new(bundle),
            storage_updates: StorageUpdates::new(),
            execution_proof: None,
        })
    }

    async fn execute_custom(&self, task: &KeeperTask, index: usize) -> Result<TaskOutcome> {
        let target = &task.target_data[index];
        let run = run_custom_script(self.runner.as_ref(), target).await?;

        let execution_proof = generate_execution_proof(
            &run.execution_id,
            &target.job_id,
            &run.storage_updates,
            &run.output,
            run.started_at,
            &self.wallet,
        )
        .await?;

        if !run.output.should_execute {
            let reason = if run.output.metadata.reason.is_empty() {
                "script decided not to execute".to_string()
            } else {
                run.output.metadata.reason.clone()
            };
            info!(task_id = target.task_id, reason = %reason, "Custom script skipped execution");
            return Ok(TaskOutcome::Skipped {
                task_id: target.task_id,
                reason,
                storage_updates: run.storage_updates,
                execution_proof: Some(execution_proof),
            });
        }

        let action = self.execute_script_call(target, &run).await?;
        let bundle = self.publish(task, action).await?;

        Ok(TaskOutcome::Executed {
            task_id: target.task_id,
            bundle: Box::new(bundle),
            storage_updates: run.storage_updates,
            execution_proof: Some(execution_proof),
        })
    }

    /// Attach proof and performer signature to an action
    async fn publish(&self, task: &KeeperTask, action: PerformerActionData) -> Result<IpfsData> {
        let task_id = action.task_id;
        let mut bundle = IpfsData {
            task_data: Some(task.clone()),
            action_data: Some(action),
            proof_data: None,
            performer_signature: None,
        };

        let certificate = self
            .certificates
            .certificate()
            .await
            .context("failed to fetch proof certificate")?;
        bundle.proof_data = Some(generate_proof(&bundle, &certificate)?);

        bundle.performer_signature = Some(PerformerSignatureData {
            task_id,
            performer_signature: String::new(),
            performer_signing_address: format!("{:?}", self.address()),
        });
        let payload = canonical_json(&bundle.signing_view())?;
        let signature = sign_payload(&self.wallet, &payload).await?;
        if let Some(performer) = bundle.performer_signature.as_mut() {
            performer.performer_signature = signature;
        }

        info!(task_id, "Task bundle signed");
        Ok(bundle)
    }
}
