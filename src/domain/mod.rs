//! Domain types for deskpilot
//!
//! This module contains the core data model:
//! - Task: one request, with budgets and tool gates applied
//! - PlanStep: one capability call chosen by the planner
//! - Observation: the structured result of a capability call
//! - RunReport: ordered step history plus the terminal reason

pub mod observation;
pub mod outcome;
pub mod plan;
pub mod task;

pub use observation::{Observation, Payload};
pub use outcome::{RunLimits, RunReport, StepRecord, TerminatedReason};
pub use plan::{Arguments, BATCH_CAPABILITY, PlanStep};
pub use task::{Task, TaskOptions, TaskRequest, ToolGate};
