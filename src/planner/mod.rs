//! Planner collaborator interface
//!
//! The orchestrator treats a planner as an untrusted oracle: it may fail to
//! bootstrap, raise on any call, or go silent. Conversation state is owned by
//! the caller and threaded through every call, so one planner value can serve
//! many tasks at once.

mod fallback;
mod scripted;
mod traced;

use async_trait::async_trait;

pub use fallback::{goal_option, parse_inline_plan};
pub use scripted::{ScriptState, Scripted, ScriptedPlanner, Turn};
pub use traced::{TraceEvent, TraceStage, TracedPlanner};

use crate::domain::{Observation, PlanStep};
use crate::error::PilotError;

/// Errors a planner may raise
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("planner backend error: {0}")]
    Backend(String),

    #[error("malformed plan step: {0}")]
    Malformed(String),
}

impl From<PlannerError> for PilotError {
    fn from(err: PlannerError) -> Self {
        PilotError::Planner(err.to_string())
    }
}

/// Chooses the next capability call for a task
#[async_trait]
pub trait Planner: Send + Sync {
    /// Per-task conversation state
    type State: Send;

    /// Build conversation state for a new goal
    async fn bootstrap(&self, goal: &str, dry_run: bool, budget_hint: Option<u32>) -> Result<Self::State, PlannerError>;

    /// Next step, or `None` when the planner has nothing to say
    async fn next_step(&self, state: &mut Self::State) -> Result<Option<PlanStep>, PlannerError>;

    /// Feed one step's observation back into the conversation
    async fn observe(&self, state: &mut Self::State, step: &PlanStep, observation: &Observation) -> Result<(), PlannerError>;
}
