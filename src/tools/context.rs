//! Call context and per-step failure classes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::capability::Capability;
use crate::domain::{Arguments, Observation, Task, ToolGate};
use crate::guardrail::Guardrails;
use crate::journal::JournalScope;

/// Default cap on text returned in observations
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000;

/// Why a single step failed. `Display` is the error string the planner sees.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolFailure {
    #[error("unknown_tool:{0}")]
    UnknownTool(String),

    #[error("policy_blocked:{0}")]
    PolicyBlocked(String),

    #[error("tool_blocked_by_request:{0}")]
    BlockedByRequest(String),

    #[error("approval_required:{0}")]
    ApprovalRequired(String),

    #[error("tool_timeout_{}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("tool_error:{0}")]
    Fault(String),
}

impl ToolFailure {
    pub fn observation(&self) -> Observation {
        Observation::failure(self.to_string())
    }
}

impl From<ToolFailure> for Observation {
    fn from(failure: ToolFailure) -> Self {
        failure.observation()
    }
}

/// Checks a step must pass before the dispatcher is invoked: the caller's
/// tool allow/deny lists and risk-category approvals
#[derive(Debug, Clone, Default)]
pub struct Preflight {
    gate: ToolGate,
    approvals: BTreeSet<String>,
}

impl Preflight {
    pub fn new(gate: ToolGate, approvals: BTreeSet<String>) -> Self {
        Self { gate, approvals }
    }

    pub fn for_task(task: &Task) -> Self {
        Self::new(task.gate(), task.approvals.clone())
    }

    /// Check a requested name (and its resolution, if any) against the gates
    pub fn check(
        &self,
        requested: &str,
        resolved: Option<&Capability>,
        args: &Arguments,
        guardrails: &Guardrails,
    ) -> Result<(), ToolFailure> {
        let mut names = vec![requested];
        if let Some(capability) = resolved {
            names.push(capability.name());
        }
        if !self.gate.permits(&names) {
            return Err(ToolFailure::BlockedByRequest(requested.to_string()));
        }

        if let Some(category) = resolved.and_then(|c| c.risk_category(args)) {
            if guardrails.approval_required(category) && !self.approvals.contains(category) {
                return Err(ToolFailure::ApprovalRequired(category.to_string()));
            }
        }
        Ok(())
    }
}

/// Everything a capability body may consult while running one call
#[derive(Clone)]
pub struct CallContext {
    pub dry_run: bool,
    /// Opaque session identity from the task options
    pub profile: Option<String>,
    pub max_output_bytes: usize,
    guardrails: Arc<Guardrails>,
    journal: Arc<JournalScope>,
    preflight: Preflight,
}

impl CallContext {
    pub fn new(guardrails: Arc<Guardrails>, journal: Arc<JournalScope>) -> Self {
        Self {
            dry_run: false,
            profile: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            guardrails,
            journal,
            preflight: Preflight::default(),
        }
    }

    pub fn for_task(task: &Task, guardrails: Arc<Guardrails>, journal: Arc<JournalScope>) -> Self {
        Self {
            dry_run: task.dry_run,
            profile: task.profile.clone(),
            preflight: Preflight::for_task(task),
            ..Self::new(guardrails, journal)
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_max_output(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn with_preflight(mut self, preflight: Preflight) -> Self {
        self.preflight = preflight;
        self
    }

    pub fn guardrails(&self) -> &Guardrails {
        &self.guardrails
    }

    pub fn journal(&self) -> &JournalScope {
        &self.journal
    }

    pub fn preflight(&self) -> &Preflight {
        &self.preflight
    }

    /// Cap text at `max_output_bytes` on a char boundary; reports whether it was cut
    pub fn truncate(&self, mut text: String) -> (String, bool) {
        if text.len() <= self.max_output_bytes {
            return (text, false);
        }
        let mut cut = self.max_output_bytes;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        (text, true)
    }
}
