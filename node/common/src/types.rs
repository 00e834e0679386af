use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Task definition, encoded on the wire as its integer id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskDefinitionId {
    TimeStatic = 1,
    TimeDynamic = 2,
    EventStatic = 3,
    EventDynamic = 4,
    ConditionStatic = 5,
    ConditionDynamic = 6,
    CustomScript = 7,
}

impl TaskDefinitionId {
    pub fn is_time(self) -> bool {
        matches!(self, Self::TimeStatic | Self::TimeDynamic)
    }

    pub fn is_event(self) -> bool {
        matches!(self, Self::EventStatic | Self::EventDynamic)
    }

    pub fn is_condition(self) -> bool {
        matches!(self, Self::ConditionStatic | Self::ConditionDynamic)
    }

    pub fn is_static_args(self) -> bool {
        matches!(self, Self::TimeStatic | Self::EventStatic | Self::ConditionStatic)
    }

    pub fn is_dynamic_args(self) -> bool {
        matches!(self, Self::TimeDynamic | Self::EventDynamic | Self::ConditionDynamic)
    }

    pub fn is_custom_script(self) -> bool {
        self == Self::CustomScript
    }
}

impl TryFrom<u8> for TaskDefinitionId {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Self::TimeStatic),
            2 => Ok(Self::TimeDynamic),
            3 => Ok(Self::EventStatic),
            4 => Ok(Self::EventDynamic),
            5 => Ok(Self::ConditionStatic),
            6 => Ok(Self::ConditionDynamic),
            7 => Ok(Self::CustomScript),
            other => Err(format!("invalid task definition id: {}", other)),
        }
    }
}

impl From<TaskDefinitionId> for u8 {
    fn from(id: TaskDefinitionId) -> u8 {
        id as u8
    }
}

impl fmt::Display for TaskDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// What to call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTargetData {
    pub job_id: String,
    pub task_id: i64,
    pub task_definition_id: TaskDefinitionId,
    pub target_chain_id: String,
    pub target_contract_address: String,
    pub target_function: String,
    #[serde(default)]
    pub abi: String,
    #[serde(default)]
    pub arg_type: i32,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub dynamic_arguments_script_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_language: Option<String>,
}

/// Why the task fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTriggerData {
    pub task_id: i64,
    pub task_definition_id: TaskDefinitionId,
    pub expiration_time: DateTime<Utc>,
    #[serde(default)]
    pub recurring: bool,
    pub current_trigger_timestamp: DateTime<Utc>,
    pub next_trigger_timestamp: DateTime<Utc>,

    // time
    #[serde(default)]
    pub time_schedule_type: String,
    #[serde(default)]
    pub time_cron_expression: String,
    #[serde(default)]
    pub time_interval: i64,

    // event
    #[serde(default)]
    pub event_chain_id: String,
    #[serde(default)]
    pub event_tx_hash: String,
    #[serde(default)]
    pub event_trigger_contract_address: String,
    #[serde(default)]
    pub event_trigger_name: String,

    // condition
    #[serde(default)]
    pub condition_type: String,
    #[serde(default)]
    pub condition_source_type: String,
    #[serde(default)]
    pub condition_source_url: String,
    #[serde(default)]
    pub condition_upper_limit: f64,
    #[serde(default)]
    pub condition_lower_limit: f64,
    #[serde(default)]
    pub condition_satisfied_value: f64,
}

/// Resource usage reported by the script sandbox
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub memory_usage: u64,
    pub cpu_percentage: f64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
    pub bandwidth_rate: f64,
    pub total_cost: f64,
    pub static_complexity: f64,
    pub dynamic_complexity: f64,
}

/// The performer's claim about what happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformerActionData {
    pub task_id: i64,
    pub action_tx_hash: String,
    pub gas_used: String,
    pub status: bool,
    #[serde(flatten)]
    pub stats: ResourceStats,
    pub total_fee: f64,
    #[serde(default)]
    pub converted_arguments: Vec<serde_json::Value>,
    pub execution_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofData {
    pub task_id: i64,
    pub proof_of_task: String,
    pub certificate_hash: String,
    pub certificate_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformerData {
    pub keeper_id: i64,
    pub keeper_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSignatureData {
    pub task_id: i64,
    pub scheduler_id: i64,
    pub scheduler_signature: String,
    pub scheduler_signing_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformerSignatureData {
    pub task_id: i64,
    pub performer_signature: String,
    pub performer_signing_address: String,
}

/// Dispatch envelope sent by a scheduler to its assigned keeper.
///
/// `target_data[i]` and `trigger_data[i]` describe the same task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeeperTask {
    pub task_id: Vec<i64>,
    #[serde(default)]
    pub performer_data: PerformerData,
    pub target_data: Vec<TaskTargetData>,
    pub trigger_data: Vec<TaskTriggerData>,
    #[serde(default)]
    pub scheduler_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_signature: Option<SchedulerSignatureData>,
}

impl KeeperTask {
    /// Copy of the envelope with the signature text blanked, as signed by the scheduler
    pub fn signing_view(&self) -> Self {
        let mut view = self.clone();
        if let Some(signature) = view.scheduler_signature.as_mut() {
            signature.scheduler_signature.clear();
        }
        view
    }
}

/// Bundle published after execution and checked by peers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpfsData {
    pub task_data: Option<KeeperTask>,
    pub action_data: Option<PerformerActionData>,
    pub proof_data: Option<ProofData>,
    pub performer_signature: Option<PerformerSignatureData>,
}

impl IpfsData {
    /// Copy with the performer signature text blanked, as signed by the performer
    pub fn signing_view(&self) -> Self {
        let mut view = self.clone();
        if let Some(signature) = view.performer_signature.as_mut() {
            signature.performer_signature.clear();
        }
        view
    }

    /// Copy with proof and signature removed, the input of the proof-of-task hash
    pub fn proof_view(&self) -> Self {
        Self {
            task_data: self.task_data.clone(),
            action_data: self.action_data.clone(),
            proof_data: None,
            performer_signature: None,
        }
    }
}

/// Storage key/value pairs a custom script wants persisted for the next run
pub type StorageUpdates = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_id_round_trips_as_integer() {
        let json = serde_json::to_string(&TaskDefinitionId::ConditionDynamic).unwrap();
        assert_eq!(json, "6");

        let id: TaskDefinitionId = serde_json::from_str("3").unwrap();
        assert_eq!(id, TaskDefinitionId::EventStatic);
        assert!(id.is_event());
        assert!(id.is_static_args());
    }

    #[test]
    fn unknown_definition_id_is_rejected() {
        let err = serde_json::from_str::<TaskDefinitionId>("9").unwrap_err();
        assert!(err.to_string().contains("invalid task definition id: 9"));
    }

    #[test]
    fn definition_id_categories() {
        let cases = [
            (TaskDefinitionId::TimeStatic, true, false, false, true),
            (TaskDefinitionId::TimeDynamic, true, false, false, false),
            (TaskDefinitionId::EventDynamic, false, true, false, false),
            (TaskDefinitionId::ConditionStatic, false, false, true, true),
            (TaskDefinitionId::CustomScript, false, false, false, false),
        ];

        for (id, time, event, condition, static_args) in cases {
            assert_eq!(id.is_time(), time, "{:?}", id);
            assert_eq!(id.is_event(), event, "{:?}", id);
            assert_eq!(id.is_condition(), condition, "{:?}", id);
            assert_eq!(id.is_static_args(), static_args, "{:?}", id);
        }
        assert!(TaskDefinitionId::CustomScript.is_custom_script());
    }

    #[test]
    fn signing_view_blanks_only_signature_text() {
        let task = KeeperTask {
            task_id: vec![1],
            scheduler_signature: Some(SchedulerSignatureData {
                task_id: 1,
                scheduler_id: 2,
                scheduler_signature: "0xdead".into(),
                scheduler_signing_address: "0xabc".into(),
            }),
            ..Default::default()
        };

        let view = task.signing_view();
        let signature = view.scheduler_signature.unwrap();
        assert!(signature.scheduler_signature.is_empty());
        assert_eq!(signature.scheduler_signing_address, "0xabc");
    }

    #[test]
    fn bundle_uses_snake_case_keys() {
        let json = serde_json::to_value(IpfsData::default()).unwrap();
        for key in ["task_data", "action_data", "proof_data", "performer_signature"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
