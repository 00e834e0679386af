use crate::{TaskValidator, ValidationError, ValidationResult};
use ethers::types::H256;
use keeper_common::types::{PerformerActionData, TaskTargetData};
use std::str::FromStr;
use tracing::{debug, info};

impl TaskValidator {
    /// Confirm the claimed action transaction landed and succeeded.
    ///
    /// Execution timing against the trigger window is not checked.
    pub async fn validate_action(
        &self,
        target: &TaskTargetData,
        action: &PerformerActionData,
    ) -> ValidationResult {
        info!(
            task_id = action.task_id,
            tx_hash = %action.action_tx_hash,
            chain_id = %target.target_chain_id,
            "Validating action data"
        );

        let client = self.client(&target.target_chain_id).await?;
        let tx_hash = H256::from_str(&action.action_tx_hash)
            .map_err(|_| ValidationError::InvalidTxHash(action.action_tx_hash.clone()))?;

        match client.transaction_receipt(tx_hash).await? {
            Some(receipt) => {
                if receipt.status.map(|status| status.as_u64()) != Some(1) {
                    return Err(ValidationError::TransactionFailed);
                }
                debug!(task_id = action.task_id, "Action transaction confirmed");
                Ok(true)
            }
            None => match client.transaction_by_hash(tx_hash).await? {
                Some(tx) if tx.block_number.is_none() => Err(ValidationError::TransactionPending),
                _ => Err(ValidationError::TransactionNotFound),
            },
        }
    }
}
