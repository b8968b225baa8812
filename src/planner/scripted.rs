//! ScriptedPlanner - replays a fixed list of turns.
//!
//! Used by the CLI's `--plan` option and throughout the tests. Each task gets
//! its own copy of the script, so one planner can drive many tasks.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use super::{Planner, PlannerError};
use crate::domain::{Observation, PlanStep};
use crate::error::{PilotError, Result};
use crate::id::generate_call_id;

/// One scripted planner turn
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this step
    Step(PlanStep),
    /// Return nothing
    Silent,
    /// Raise from `next_step`
    Fail(String),
}

/// What the planner saw for one call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub call_id: Option<String>,
    pub capability: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// Per-task conversation state
#[derive(Debug, Clone)]
pub struct ScriptState {
    pub goal: String,
    pub dry_run: bool,
    pub budget_hint: Option<u32>,
    pub transcript: Vec<Turn>,
    queue: VecDeque<Scripted>,
}

impl ScriptState {
    /// Turns not yet handed out
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedPlanner {
    script: Vec<Scripted>,
    bootstrap_error: Option<String>,
    observe_error_at: Option<usize>,
}

impl ScriptedPlanner {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// A planner that returns each step once, then goes silent
    pub fn from_steps(steps: impl IntoIterator<Item = PlanStep>) -> Self {
        Self::new(steps.into_iter().map(Scripted::Step).collect())
    }

    /// A planner that never proposes anything
    pub fn silent() -> Self {
        Self::default()
    }

    /// Load a YAML (or JSON) list of plan steps
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PilotError::InvalidInput(format!("failed to read plan {}: {}", path.display(), e)))?;
        let steps: Vec<PlanStep> = serde_yaml::from_str(&content)?;
        log::debug!("Loaded {} scripted step(s) from {}", steps.len(), path.display());
        Ok(Self::from_steps(steps))
    }

    /// Make `bootstrap` fail with the given message
    pub fn failing_bootstrap(mut self, message: impl Into<String>) -> Self {
        self.bootstrap_error = Some(message.into());
        self
    }

    /// Make the n-th `observe` call (zero-based) fail
    pub fn failing_observe_at(mut self, index: usize) -> Self {
        self.observe_error_at = Some(index);
        self
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    type State = ScriptState;

    async fn bootstrap(&self, goal: &str, dry_run: bool, budget_hint: Option<u32>) -> std::result::Result<ScriptState, PlannerError> {
        if let Some(message) = &self.bootstrap_error {
            return Err(PlannerError::Bootstrap(message.clone()));
        }
        Ok(ScriptState {
            goal: goal.to_string(),
            dry_run,
            budget_hint,
            transcript: Vec::new(),
            queue: self.script.iter().cloned().collect(),
        })
    }

    async fn next_step(&self, state: &mut ScriptState) -> std::result::Result<Option<PlanStep>, PlannerError> {
        match state.queue.pop_front() {
            Some(Scripted::Step(step)) if step.call_id.is_none() => Ok(Some(step.with_call_id(generate_call_id()))),
            Some(Scripted::Step(step)) => Ok(Some(step)),
            Some(Scripted::Fail(message)) => Err(PlannerError::Backend(message)),
            Some(Scripted::Silent) | None => Ok(None),
        }
    }

    async fn observe(
        &self,
        state: &mut ScriptState,
        step: &PlanStep,
        observation: &Observation,
    ) -> std::result::Result<(), PlannerError> {
        if self.observe_error_at == Some(state.transcript.len()) {
            return Err(PlannerError::Backend("observe rejected".to_string()));
        }
        state.transcript.push(Turn {
            call_id: step.call_id.clone(),
            capability: step.capability_name.clone(),
            ok: observation.is_ok(),
            error: observation.error().map(str::to_string),
        });
        Ok(())
    }
}
