use crate::{TaskValidator, ValidationError, ValidationResult};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ethers::{
    types::{Address, H256},
    utils::keccak256,
};
use keeper_common::types::{TaskDefinitionId, TaskTriggerData};
use std::str::FromStr;
use tracing::{debug, info};

/// Slack allowed between block time and trigger expiry, in milliseconds
pub const EVENT_TIME_TOLERANCE_MS: i64 = 1100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Between,
}

impl ConditionOperator {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "greater_than" => Some(Self::GreaterThan),
            "less_than" => Some(Self::LessThan),
            "greater_equal" => Some(Self::GreaterEqual),
            "less_equal" => Some(Self::LessEqual),
            "between" => Some(Self::Between),
            _ => None,
        }
    }

    /// Single-bound operators compare against the upper limit
    pub fn holds(self, value: f64, lower: f64, upper: f64) -> bool {
        match self {
            Self::Equals => value == upper,
            Self::NotEquals => value != upper,
            Self::GreaterThan => value > upper,
            Self::LessThan => value < upper,
            Self::GreaterEqual => value >= upper,
            Self::LessEqual => value <= upper,
            Self::Between => value >= lower && value <= upper,
        }
    }
}

fn check_expiry(trigger: &TaskTriggerData) -> Result<(), ValidationError> {
    if trigger.expiration_time < trigger.next_trigger_timestamp {
        return Err(ValidationError::ExpiredBeforeTrigger);
    }
    Ok(())
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl TaskValidator {
    pub async fn validate_trigger(&self, trigger: &TaskTriggerData) -> ValidationResult {
        info!(
            task_id = trigger.task_id,
            definition = %trigger.task_definition_id,
            "Validating trigger data"
        );

        match trigger.task_definition_id {
            TaskDefinitionId::TimeStatic | TaskDefinitionId::TimeDynamic => {
                check_expiry(trigger)?;
                Ok(true)
            }
            TaskDefinitionId::EventStatic | TaskDefinitionId::EventDynamic => {
                self.validate_event_trigger(trigger).await
            }
            TaskDefinitionId::ConditionStatic | TaskDefinitionId::ConditionDynamic => {
                validate_condition_trigger(trigger)
            }
            TaskDefinitionId::CustomScript => {
                check_expiry(trigger)?;
                Ok(true)
            }
        }
    }

    async fn validate_event_trigger(&self, trigger: &TaskTriggerData) -> ValidationResult {
        check_expiry(trigger)?;

        let client = self.client(&trigger.event_chain_id).await?;
        let contract = Address::from_str(&trigger.event_trigger_contract_address).map_err(|_| {
            ValidationError::InvalidAddress(trigger.event_trigger_contract_address.clone())
        })?;

        let code = client.code_at(contract).await?;
        if code.is_empty() {
            return Err(ValidationError::NoContract(
                trigger.event_trigger_contract_address.clone(),
            ));
        }

        let tx_hash = H256::from_str(&trigger.event_tx_hash)
            .map_err(|_| ValidationError::InvalidTxHash(trigger.event_tx_hash.clone()))?;

        let receipt = match client.transaction_receipt(tx_hash).await? {
            Some(receipt) => receipt,
            None => {
                return Err(match client.transaction_by_hash(tx_hash).await? {
                    Some(tx) if tx.block_number.is_none() => ValidationError::TransactionPending,
                    _ => ValidationError::TransactionNotFound,
                });
            }
        };

        if receipt.status.map(|status| status.as_u64()) != Some(1) {
            return Err(ValidationError::TransactionFailed);
        }

        match receipt.logs.first() {
            Some(log) if log.address == contract => {}
            _ => return Err(ValidationError::WrongTargetContract),
        }

        let event_hash = H256::from(keccak256(trigger.event_trigger_name.as_bytes()));
        let event_found = receipt
            .logs
            .iter()
            .any(|log| log.topics.contains(&event_hash));
        if !event_found {
            return Err(ValidationError::WrongEventName);
        }

        let block = receipt
            .block_number
            .ok_or(ValidationError::TransactionPending)?;
        let timestamp = client
            .block_timestamp(block)
            .await?
            .ok_or(ValidationError::TransactionNotFound)?;
        let tx_time = DateTime::<Utc>::from_timestamp(timestamp.low_u64() as i64, 0)
            .ok_or(ValidationError::TransactionNotFound)?;

        let limit = trigger.expiration_time + Duration::milliseconds(EVENT_TIME_TOLERANCE_MS);
        if tx_time > limit {
            return Err(ValidationError::LateTransaction {
                tx: rfc3339(tx_time),
                limit: rfc3339(limit),
            });
        }

        debug!(task_id = trigger.task_id, block = %block, "Event trigger confirmed");
        Ok(true)
    }
}

fn validate_condition_trigger(trigger: &TaskTriggerData) -> ValidationResult {
    check_expiry(trigger)?;

    let Some(operator) = ConditionOperator::parse(&trigger.condition_source_type) else {
        debug!(
            task_id = trigger.task_id,
            operator = %trigger.condition_source_type,
            "Unknown condition operator"
        );
        return Ok(false);
    };

    Ok(operator.holds(
        trigger.condition_satisfied_value,
        trigger.condition_lower_limit,
        trigger.condition_upper_limit,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_operators() {
        let cases = [
            ("equals", 10.0, true),
            ("equals", 9.0, false),
            ("not_equals", 9.0, true),
            ("greater_than", 11.0, true),
            ("greater_than", 10.0, false),
            ("less_than", 9.0, true),
            ("greater_equal", 10.0, true),
            ("less_equal", 10.0, true),
            ("less_equal", 10.5, false),
            ("between", 5.0, true),
            ("between", 1.0, true),
            ("between", 0.5, false),
            ("between", 10.5, false),
        ];

        for (name, value, expected) in cases {
            let operator = ConditionOperator::parse(name).unwrap();
            assert_eq!(operator.holds(value, 1.0, 10.0), expected, "{} {}", name, value);
        }
    }

    #[test]
    fn unknown_operator_is_not_parsed() {
        assert!(ConditionOperator::parse("approximately").is_none());
        assert!(ConditionOperator::parse("").is_none());
    }
}
