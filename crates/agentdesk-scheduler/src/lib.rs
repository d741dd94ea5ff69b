//! # Agentdesk Scheduler
//!
//! Task planning and scheduling engine for agent automation.
//! Accepts task descriptors, computes next run times, fires tasks at the
//! right moment and tracks their lifecycle.
//!
//! ## Design Principles
//! - No external services: JSON file or SQLite persistence
//! - Survives restarts, tasks are re-armed on load
//! - One tokio interval drives every trigger, zero work when nothing is due
//! - Collaborators (agents, workflows, mail, files) sit behind traits
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval)
//!   ├── datetime:    "2024-01-20T10:00" → fire once
//!   ├── recurring:   daily / weekly / monthly / weekend @ HH:MM
//!   ├── seasonal:    spring / summer / autumn / winter @ HH:MM
//!   ├── conditional: file exists / time window, probed every 5 min
//!   └── on trigger → ActionDispatcher
//!                      ├── AgentRunner
//!                      ├── WorkflowRunner
//!                      ├── EmailSender
//!                      ├── FileOperator
//!                      └── CustomActionRunner (simulated or webhook)
//! ```

pub mod api;
pub mod clock;
pub mod condition;
pub mod dispatch;
pub mod engine;
pub mod persistence;
pub mod recurrence;
pub mod store;
pub mod tasks;
pub mod triggers;

pub use api::{OpResponse, PlanResponse, PlannedTask, SchedulerStats, TaskDescriptor, TaskUpdate};
pub use clock::{Clock, FixedClock, SystemClock};
pub use dispatch::{ActionDispatcher, Collaborators, SimulatedCollaborator, WebhookActionRunner};
pub use engine::{FiringReport, Scheduler, StoredTasks, open_store};
pub use persistence::SqliteTaskStore;
pub use store::{JsonTaskStore, MemoryTaskStore, TaskRecordStore};
pub use tasks::{
    Action, ActionType, Condition, NextExecution, Recurrence, Schedule, ScheduleType, Season,
    Task, TaskStatus, TimeWindow, Timestamp,
};
pub use triggers::Trigger;
