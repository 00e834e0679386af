use crate::{TaskValidator, ValidationError, ValidationResult};
use keeper_common::{
    crypto::{canonical_json, verify_payload},
    types::{IpfsData, KeeperTask},
};
use tracing::debug;

impl TaskValidator {
    /// Scheduler signs the dispatch envelope with its signature text blanked
    pub fn validate_scheduler_signature(&self, task: &KeeperTask) -> ValidationResult {
        let signature = task
            .scheduler_signature
            .as_ref()
            .ok_or(ValidationError::MissingSchedulerSignature)?;

        if signature.scheduler_signature.is_empty() {
            return Err(ValidationError::EmptySchedulerSignature);
        }
        if signature.scheduler_signing_address.is_empty() {
            return Err(ValidationError::EmptySchedulerAddress);
        }

        let payload = canonical_json(&task.signing_view())?;
        verify_payload(
            &payload,
            &signature.scheduler_signature,
            &signature.scheduler_signing_address,
        )
        .map_err(|e| ValidationError::BadSignature(e.to_string()))?;

        debug!(scheduler_id = signature.scheduler_id, "Scheduler signature verified");
        Ok(true)
    }

    /// Performer signs the published bundle with its signature text blanked
    pub fn validate_performer_signature(&self, ipfs: &IpfsData) -> ValidationResult {
        let signature = ipfs
            .performer_signature
            .as_ref()
            .ok_or(ValidationError::MissingPerformerSignature)?;

        if signature.performer_signature.is_empty() {
            return Err(ValidationError::EmptyPerformerSignature);
        }
        if signature.performer_signing_address.is_empty() {
            return Err(ValidationError::EmptyPerformerAddress);
        }

        if let Some(task) = &ipfs.task_data {
            let assigned = &task.performer_data.keeper_address;
            if !assigned.is_empty()
                && !assigned.eq_ignore_ascii_case(&signature.performer_signing_address)
            {
                return Err(ValidationError::PerformerMismatch);
            }
        }

        let payload = canonical_json(&ipfs.signing_view())?;
        verify_payload(
            &payload,
            &signature.performer_signature,
            &signature.performer_signing_address,
        )
        .map_err(|e| ValidationError::BadSignature(e.to_string()))?;

        debug!(task_id = signature.task_id, "Performer signature verified");
        Ok(true)
    }
}
