use crate::abi::{execute_function, find_method};
use crate::convert::{token_to_json, SourceValue};
use crate::custom::CustomScriptRun;
use crate::dynamic::{parse_dynamic_args, parse_static_args};
use crate::executor::TaskExecutor;
use crate::sandbox::ScriptRequest;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use ethers::{
    abi::Token,
    types::{Address, Bytes, TransactionReceipt, U256},
};
use keeper_common::types::{
    PerformerActionData, ResourceStats, TaskDefinitionId, TaskTargetData, TaskTriggerData,
};
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const STATIC_TOTAL_COST: f64 = 0.1;

/// How early a time task starts preparing before its trigger
pub fn lead_time(definition: TaskDefinitionId) -> Duration {
    match definition {
        TaskDefinitionId::TimeDynamic => Duration::from_secs(4),
        _ => Duration::from_secs(2),
    }
}

/// Call data for the target plus what it cost to produce
pub struct PreparedCall {
    pub target: Address,
    pub call_data: Vec<u8>,
    pub arguments: Vec<Token>,
    pub stats: ResourceStats,
}

impl TaskExecutor {
    async fn wait_for_trigger(&self, target: &TaskTargetData, trigger: &TaskTriggerData) {
        if !target.task_definition_id.is_time() {
            return;
        }

        let lead = chrono::Duration::from_std(lead_time(target.task_definition_id))
            .unwrap_or_else(|_| chrono::Duration::zero());
        let wait = (trigger.next_trigger_timestamp - lead - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        if !wait.is_zero() {
            debug!(task_id = target.task_id, wait_ms = wait.as_millis() as u64, "Waiting for trigger time");
            tokio::time::sleep(wait).await;
        }
    }

    /// Resolve the method, gather arguments and pack the target call
    pub async fn prepare_call(&self, target: &TaskTargetData) -> Result<PreparedCall> {
        if target.target_contract_address.is_empty() {
            bail!("target contract address is empty");
        }
        let address = Address::from_str(&target.target_contract_address)
            .map_err(|_| anyhow!("invalid target contract address: {}", target.target_contract_address))?;

        let method = find_method(&target.abi, &target.target_function)?;

        let (args, stats) = match target.task_definition_id {
            id if id.is_dynamic_args() => self.dynamic_arguments(target).await?,
            id if id.is_static_args() => (
                parse_static_args(&target.arguments),
                ResourceStats {
                    total_cost: STATIC_TOTAL_COST,
                    ..Default::default()
                },
            ),
            id => bail!("unsupported task definition id: {}", id),
        };

        let arguments = self
            .converter
            .process_arguments(&SourceValue::from(Value::Array(args)), &method.inputs)?;
        let call_data = method.encode_call(&arguments);

        debug!(
            task_id = target.task_id,
            method = %method.signature(),
            bytes = call_data.len(),
            "Packed call data"
        );

        Ok(PreparedCall {
            target: address,
            call_data,
            arguments,
            stats,
        })
    }

    async fn dynamic_arguments(&self, target: &TaskTargetData) -> Result<(Vec<Value>, ResourceStats)> {
        let request = ScriptRequest {
            script_url: target.dynamic_arguments_script_url.clone(),
            language: target.script_language.clone().unwrap_or_default(),
            attester_count: 1,
            metadata: json!({
                "job_id": target.job_id,
                "task_id": target.task_id,
                "target_function": target.target_function,
            }),
        };

        let outcome = self
            .runner
            .run(&request)
            .await
            .context("failed to execute dynamic arguments script")?;
        if !outcome.success {
            bail!(
                "failed to execute dynamic arguments script: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }

        Ok((parse_dynamic_args(&outcome.output), outcome.stats))
    }

    /// Time, event and condition tasks go through the execution contract
    pub(crate) async fn execute_action(
        &self,
        target: &TaskTargetData,
        trigger: &TaskTriggerData,
    ) -> Result<PerformerActionData> {
        self.wait_for_trigger(target, trigger).await;

        let prepared = self.prepare_call(target).await?;

        let job_id = U256::from_dec_str(&target.job_id)
            .map_err(|_| anyhow!("invalid job id: {}", target.job_id))?;
        let tg_amount = U256::from_dec_str(&format!("{:.0}", prepared.stats.total_cost * 1e18))
            .map_err(|_| anyhow!("invalid total cost: {}", prepared.stats.total_cost))?;

        let data = execute_function().encode_call(&[
            Token::Uint(job_id),
            Token::Uint(tg_amount),
            Token::Address(prepared.target),
            Token::Bytes(prepared.call_data.clone()),
        ]);

        let contract = self.registry.execution_contract(&target.target_chain_id)?;
        let receipt = self
            .submit(&target.target_chain_id, contract, data.into())
            .await?;

        info!(
            task_id = target.task_id,
            tx_hash = ?receipt.transaction_hash,
            status = ?receipt.status,
            "Action executed"
        );

        let arguments = prepared.arguments.iter().map(token_to_json).collect();
        Ok(action_data(target.task_id, &receipt, prepared.stats, arguments))
    }

    /// Custom scripts call their chosen contract directly
    pub(crate) async fn execute_script_call(
        &self,
        target: &TaskTargetData,
        run: &CustomScriptRun,
    ) -> Result<PerformerActionData> {
        let to = Address::from_str(&run.output.target_contract)
            .map_err(|_| anyhow!("invalid target contract address: {}", run.output.target_contract))?;
        let calldata = hex::decode(run.output.calldata.trim_start_matches("0x"))
            .context("calldata is not valid hex")?;

        let receipt = self
            .submit(&target.target_chain_id, to, calldata.into())
            .await?;

        info!(
            task_id = target.task_id,
            execution_id = %run.execution_id,
            tx_hash = ?receipt.transaction_hash,
            "Custom script call executed"
        );

        Ok(action_data(target.task_id, &receipt, run.script.stats.clone(), Vec::new()))
    }

    /// Deliver a call and require a successful receipt
    async fn submit(&self, chain_id: &str, to: Address, data: Bytes) -> Result<TransactionReceipt> {
        let client = self.registry.client(chain_id).await?;
        let numeric_chain_id = client.chain_id().await?;
        let manager = self.nonce_manager(chain_id).await?;

        let nonce = manager.get_next_nonce().await?;
        let receipt = manager
            .submit_transaction(nonce, to, data, numeric_chain_id, &self.wallet)
            .await?;
        if receipt.status.map(|s| s.as_u64()) != Some(1) {
            bail!("transaction {:?} reverted", receipt.transaction_hash);
        }
        Ok(receipt)
    }
}

fn action_data(
    task_id: i64,
    receipt: &TransactionReceipt,
    stats: ResourceStats,
    converted_arguments: Vec<Value>,
) -> PerformerActionData {
    PerformerActionData {
        task_id,
        action_tx_hash: format!("{:?}", receipt.transaction_hash),
        gas_used: receipt.gas_used.unwrap_or_default().to_string(),
        status: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false),
        total_fee: stats.total_cost,
        stats,
        converted_arguments,
        execution_timestamp: Utc::now(),
    }
}
