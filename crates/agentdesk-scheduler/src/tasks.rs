//! Task definitions: the core data model for scheduled work.
//!
//! Schedule and target payloads are tagged enums: the `schedule_type` tag picks
//! the `schedule_config` shape and the `action_type` tag picks the `target`
//! shape, so a task can never carry a config that does not match its type.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use agentdesk_core::SchedulerError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Wall-clock instant in the scheduler's local time.
pub type Timestamp = NaiveDateTime;

/// A scheduled task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// What to do when triggered.
    pub action: Action,
    /// When/how to trigger.
    pub schedule: Schedule,
    pub status: TaskStatus,
    pub created_at: Timestamp,
    /// Most recent resolver output.
    pub next_execution: Option<NextExecution>,
    pub last_execution: Option<Timestamp>,
    /// Firing attempts so far, errored ones included.
    pub execution_count: u32,
    /// `-1` = unlimited.
    pub max_executions: i64,
    pub enabled: bool,
    pub last_error: Option<String>,
}

/// What the task does when triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", content = "target", rename_all = "snake_case")]
pub enum Action {
    AgentExecution {
        agent_name: String,
    },
    WorkflowExecution {
        workflow_name: String,
    },
    EmailSend {
        recipients: Vec<String>,
        #[serde(default)]
        subject: String,
        /// Owner whose SMTP settings are used.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    FileOperation {
        operation: String,
        file_path: String,
    },
    CustomAction {
        action: String,
    },
}

/// How/when the task triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schedule_type", content = "schedule_config", rename_all = "snake_case")]
pub enum Schedule {
    /// Run once at a specific time.
    Datetime { datetime: Timestamp },
    Recurring(Recurrence),
    /// Yearly, on a season's first day.
    Seasonal { season: Season, time: String },
    /// Fire when a condition becomes true.
    Conditional { condition: Condition },
}

/// Recurrence rules. `time` is `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "snake_case")]
pub enum Recurrence {
    Daily { time: String },
    Weekly { day: String, time: String },
    /// `day` must be 1..=28.
    Monthly { day: u32, time: String },
    Weekend { time: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    #[serde(alias = "fall")]
    Autumn,
    Winter,
}

impl Season {
    /// Fixed (month, day) anchor.
    pub fn anchor(&self) -> (u32, u32) {
        match self {
            Season::Spring => (3, 21),
            Season::Summer => (6, 21),
            Season::Autumn => (9, 21),
            Season::Winter => (12, 21),
        }
    }
}

/// Trigger conditions for conditional tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    File {
        file_path: PathBuf,
    },
    Time {
        #[serde(default)]
        time_condition: TimeWindow,
    },
    /// Mail-arrival hook; never fires.
    Email {
        email_subject: Option<String>,
        email_sender: Option<String>,
    },
}

/// Time-of-day window; bounds are `HH:MM` and inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Planned,
    Executing,
    Completed,
    Error,
}

/// Resolver output stored on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NextExecution {
    At(Timestamp),
    /// No instant: the condition evaluator decides.
    Conditional,
    /// Resolution failed with this message.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AgentExecution,
    WorkflowExecution,
    EmailSend,
    FileOperation,
    CustomAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Datetime,
    Recurring,
    Seasonal,
    Conditional,
}

impl Task {
    pub fn schedule_type(&self) -> ScheduleType {
        self.schedule.schedule_type()
    }

    pub fn action_type(&self) -> ActionType {
        self.action.action_type()
    }

    /// Whether the execution cap has been hit.
    pub fn cap_reached(&self) -> bool {
        self.max_executions > 0 && i64::from(self.execution_count) >= self.max_executions
    }

    /// The next fire instant, if the last resolution produced one.
    pub fn next_at(&self) -> Option<Timestamp> {
        match &self.next_execution {
            Some(NextExecution::At(at)) => Some(*at),
            _ => None,
        }
    }
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Action::AgentExecution { .. } => ActionType::AgentExecution,
            Action::WorkflowExecution { .. } => ActionType::WorkflowExecution,
            Action::EmailSend { .. } => ActionType::EmailSend,
            Action::FileOperation { .. } => ActionType::FileOperation,
            Action::CustomAction { .. } => ActionType::CustomAction,
        }
    }

    /// Build a target from a loosely-typed payload, rejecting missing or blank fields.
    pub fn from_target(
        action_type: ActionType,
        target: &serde_json::Value,
    ) -> Result<Self, SchedulerError> {
        let tagged = serde_json::json!({ "action_type": action_type, "target": target });
        let action: Action = serde_json::from_value(tagged).map_err(|e| {
            SchedulerError::Configuration(format!("invalid target for {action_type}: {e}"))
        })?;
        action.validate()?;
        Ok(action)
    }

    fn validate(&self) -> Result<(), SchedulerError> {
        let blank = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(SchedulerError::Configuration(format!(
                    "{} requires a non-empty '{field}'",
                    self.action_type()
                )))
            } else {
                Ok(())
            }
        };
        match self {
            Action::AgentExecution { agent_name } => blank("agent_name", agent_name),
            Action::WorkflowExecution { workflow_name } => blank("workflow_name", workflow_name),
            Action::EmailSend { recipients, .. } => {
                if recipients.iter().all(|r| r.trim().is_empty()) {
                    return Err(SchedulerError::Configuration(
                        "email_send requires at least one recipient".into(),
                    ));
                }
                Ok(())
            }
            Action::FileOperation { operation, file_path } => {
                blank("operation", operation)?;
                blank("file_path", file_path)
            }
            Action::CustomAction { action } => blank("action", action),
        }
    }
}

impl Schedule {
    pub fn schedule_type(&self) -> ScheduleType {
        match self {
            Schedule::Datetime { .. } => ScheduleType::Datetime,
            Schedule::Recurring(_) => ScheduleType::Recurring,
            Schedule::Seasonal { .. } => ScheduleType::Seasonal,
            Schedule::Conditional { .. } => ScheduleType::Conditional,
        }
    }

    /// Recurring and seasonal schedules re-arm after each firing.
    pub fn repeats(&self) -> bool {
        matches!(self, Schedule::Recurring(_) | Schedule::Seasonal { .. })
    }

    /// Build a schedule from a loosely-typed payload. Shape problems (missing
    /// fields, unknown frequency or season) are configuration errors; value
    /// problems such as a malformed `HH:MM` are left to the resolver.
    pub fn from_config(
        schedule_type: ScheduleType,
        config: &serde_json::Value,
    ) -> Result<Self, SchedulerError> {
        if schedule_type == ScheduleType::Datetime {
            let raw = config
                .get("datetime")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    SchedulerError::Configuration("datetime schedule requires 'datetime'".into())
                })?;
            let datetime = parse_datetime(raw).ok_or_else(|| {
                SchedulerError::Configuration(format!("invalid datetime '{raw}'"))
            })?;
            return Ok(Schedule::Datetime { datetime });
        }

        let tagged =
            serde_json::json!({ "schedule_type": schedule_type, "schedule_config": config });
        let schedule: Schedule = serde_json::from_value(tagged).map_err(|e| {
            SchedulerError::Configuration(format!("invalid schedule_config for {schedule_type}: {e}"))
        })?;
        if let Schedule::Conditional {
            condition: Condition::File { file_path },
        } = &schedule
        {
            if file_path.as_os_str().is_empty() {
                return Err(SchedulerError::Configuration(
                    "file condition requires a non-empty 'file_path'".into(),
                ));
            }
        }
        Ok(schedule)
    }
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS[.f]]`, the same with a space separator, or RFC 3339
/// (converted to local time).
pub fn parse_datetime(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Local).naive_local())
}

impl fmt::Display for NextExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextExecution::At(at) => write!(f, "{}", at.format("%Y-%m-%dT%H:%M:%S")),
            NextExecution::Conditional => write!(f, "Conditional"),
            NextExecution::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Planned => write!(f, "planned"),
            TaskStatus::Executing => write!(f, "executing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "planned" => Ok(TaskStatus::Planned),
            "executing" => Ok(TaskStatus::Executing),
            "completed" => Ok(TaskStatus::Completed),
            "error" => Ok(TaskStatus::Error),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::AgentExecution => write!(f, "agent_execution"),
            ActionType::WorkflowExecution => write!(f, "workflow_execution"),
            ActionType::EmailSend => write!(f, "email_send"),
            ActionType::FileOperation => write!(f, "file_operation"),
            ActionType::CustomAction => write!(f, "custom_action"),
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleType::Datetime => write!(f, "datetime"),
            ScheduleType::Recurring => write!(f, "recurring"),
            ScheduleType::Seasonal => write!(f, "seasonal"),
            ScheduleType::Conditional => write!(f, "conditional"),
        }
    }
}
