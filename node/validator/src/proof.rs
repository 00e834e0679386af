use crate::{TaskValidator, ValidationError, ValidationResult};
use keeper_common::{
    proof::{certificate_hash, proof_of_task},
    types::IpfsData,
};
use tracing::{debug, warn};

impl TaskValidator {
    pub async fn validate_proof(&self, ipfs: &IpfsData) -> ValidationResult {
        let proof = ipfs.proof_data.as_ref().ok_or(ValidationError::MissingProof)?;

        if proof.proof_of_task.is_empty() {
            return Err(ValidationError::EmptyProofOfTask);
        }
        if proof.certificate_hash.is_empty() {
            return Err(ValidationError::EmptyCertificateHash);
        }

        // A certificate mismatch is logged only
        if let Some(source) = &self.certificates {
            match source.certificate().await {
                Ok(der) => {
                    let current = certificate_hash(&der);
                    if current != proof.certificate_hash {
                        warn!(
                            task_id = proof.task_id,
                            claimed = %proof.certificate_hash,
                            current = %current,
                            "Certificate hash mismatch"
                        );
                    }
                }
                Err(e) => warn!(task_id = proof.task_id, "Failed to fetch TLS certificate: {}", e),
            }
        }

        let computed = proof_of_task(ipfs)?;
        if computed != proof.proof_of_task {
            return Err(ValidationError::ProofMismatch {
                claimed: proof.proof_of_task.clone(),
                computed,
            });
        }

        debug!(task_id = proof.task_id, "Proof of task verified");
        Ok(true)
    }
}
