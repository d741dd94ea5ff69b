//! Request and response shapes for the presentation layer.
//!
//! Requests arrive loosely typed (forms, REST bodies); the engine turns them
//! into typed schedules and actions. Responses are plain result objects whose
//! `error` field is rendered verbatim.

use agentdesk_core::SchedulerError;
use serde::{Deserialize, Serialize};

use crate::tasks::{ActionType, NextExecution, ScheduleType};

/// A task submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "type")]
    pub action_type: ActionType,
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub schedule_config: serde_json::Value,
    #[serde(default)]
    pub target: serde_json::Value,
    #[serde(default = "unlimited")]
    pub max_executions: i64,
}

fn unlimited() -> i64 {
    -1
}

/// Fields a caller may change on an existing task. Absent fields are untouched;
/// `schedule_type` and `action_type` are fixed at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub max_executions: Option<i64>,
    #[serde(default)]
    pub schedule_config: Option<serde_json::Value>,
    #[serde(default)]
    pub target: Option<serde_json::Value>,
}

impl TaskUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }
}

/// Result of a successful `plan_task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub task_id: String,
    pub name: String,
    pub next_execution: Option<NextExecution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total: usize,
    pub enabled: usize,
    pub completed: usize,
    pub error: usize,
    /// Tasks whose action is running right now.
    pub executing: usize,
    /// Whether the background loop is running.
    pub running: bool,
}

/// `{success, task_id, message, next_execution}` or `{success: false, error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_execution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<PlannedTask, SchedulerError>> for PlanResponse {
    fn from(result: Result<PlannedTask, SchedulerError>) -> Self {
        match result {
            Ok(planned) => Self {
                success: true,
                message: Some(format!("Task '{}' scheduled", planned.name)),
                next_execution: planned.next_execution.as_ref().map(ToString::to_string),
                task_id: Some(planned.task_id),
                error: None,
            },
            Err(e) => Self {
                success: false,
                task_id: None,
                message: None,
                next_execution: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Outcome of update/delete/enable/disable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<bool, SchedulerError>> for OpResponse {
    fn from(result: Result<bool, SchedulerError>) -> Self {
        match result {
            Ok(true) => Self { success: true, error: None },
            Ok(false) => Self {
                success: false,
                error: Some("Task not found".into()),
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_accepts_form_payload() {
        let d: TaskDescriptor = serde_json::from_value(json!({
            "name": "Saturday report",
            "type": "agent_execution",
            "schedule_type": "recurring",
            "schedule_config": {"frequency": "weekend", "time": "10:00"},
            "target": {"agent_name": "reporter"}
        }))
        .unwrap();
        assert_eq!(d.action_type, ActionType::AgentExecution);
        assert_eq!(d.max_executions, -1);
    }

    #[test]
    fn test_plan_response_shapes() {
        let ok = PlanResponse::from(Ok(PlannedTask {
            task_id: "task_1".into(),
            name: "n".into(),
            next_execution: Some(NextExecution::Conditional),
        }));
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["next_execution"], "Conditional");
        assert!(v.get("error").is_none());

        let err = PlanResponse::from(Err(SchedulerError::Configuration("missing 'time'".into())));
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "Configuration error: missing 'time'");
    }

    #[test]
    fn test_op_response_not_found() {
        let r = OpResponse::from(Ok(false));
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("Task not found"));
    }
}
