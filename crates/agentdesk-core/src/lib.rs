//! # Agentdesk Core
//!
//! Configuration and error types shared by the scheduler crate and the binary.

pub mod config;
pub mod error;

pub use config::{AgentdeskConfig, SchedulerConfig, StoreBackend};
pub use error::{DispatchError, ResolutionError, Result, SchedulerError, StoreError};
