//! Task - one incoming request, immutable once created.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::guardrail::GuardrailDefaults;

/// Options recognized on task submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Overrides the default step budget
    pub max_steps: Option<u32>,
    /// Capability names the loop may dispatch (empty = all)
    pub allowed_tools: BTreeSet<String>,
    /// Capability names the loop must never dispatch
    pub blocked_tools: BTreeSet<String>,
    /// Opaque session identity passed through to capabilities
    pub profile: Option<String>,
    /// Risk categories the user has explicitly approved for this task
    pub approvals: BTreeSet<String>,
}

/// Task submission: goal plus flags, before defaults are applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub goal: String,
    #[serde(default)]
    pub dry_run: bool,
    /// Free-form budget hint forwarded to the planner
    #[serde(default)]
    pub budget: Option<u32>,
    #[serde(default)]
    pub options: TaskOptions,
}

impl TaskRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Default::default()
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.options.max_steps = Some(max_steps);
        self
    }

    pub fn block_tool(mut self, name: impl Into<String>) -> Self {
        self.options.blocked_tools.insert(name.into());
        self
    }

    pub fn allow_tool(mut self, name: impl Into<String>) -> Self {
        self.options.allowed_tools.insert(name.into());
        self
    }

    pub fn approve(mut self, category: impl Into<String>) -> Self {
        self.options.approvals.insert(category.into());
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.options.profile = Some(profile.into());
        self
    }
}

/// Allow/deny list of capability names requested by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolGate {
    allowed: BTreeSet<String>,
    blocked: BTreeSet<String>,
}

impl ToolGate {
    pub fn new<A, B>(allowed: A, blocked: B) -> Self
    where
        A: IntoIterator<Item = String>,
        B: IntoIterator<Item = String>,
    {
        Self {
            allowed: allowed.into_iter().map(|s| s.to_lowercase()).collect(),
            blocked: blocked.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Check a capability under every spelling it is known by.
    ///
    /// Blocked wins over allowed; an empty allow list admits everything not blocked.
    pub fn permits(&self, names: &[&str]) -> bool {
        let names: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
        if names.iter().any(|n| self.blocked.contains(n)) {
            return false;
        }
        self.allowed.is_empty() || names.iter().any(|n| self.allowed.contains(n))
    }
}

/// A task ready to run: request merged with guardrail defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub goal: String,
    pub dry_run: bool,
    pub step_budget: u32,
    pub per_call_timeout: Duration,
    pub allowed_tools: BTreeSet<String>,
    pub blocked_tools: BTreeSet<String>,
    pub profile: Option<String>,
    pub approvals: BTreeSet<String>,
    pub budget_hint: Option<u32>,
}

impl Task {
    /// Fill unset budgets from the guardrail defaults
    pub fn from_request(request: TaskRequest, defaults: &GuardrailDefaults) -> Self {
        let TaskRequest {
            goal,
            dry_run,
            budget,
            options,
        } = request;

        Self {
            goal,
            dry_run,
            step_budget: options.max_steps.unwrap_or(defaults.max_total_steps),
            per_call_timeout: Duration::from_secs(defaults.max_tool_runtime_sec),
            allowed_tools: options.allowed_tools,
            blocked_tools: options.blocked_tools,
            profile: options.profile,
            approvals: options.approvals,
            budget_hint: budget,
        }
    }

    /// Override the per-call deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    /// Wall-clock ceiling for the whole loop
    pub fn time_ceiling(&self) -> Duration {
        self.per_call_timeout.saturating_mul(self.step_budget)
    }

    pub fn gate(&self) -> ToolGate {
        ToolGate::new(self.allowed_tools.iter().cloned(), self.blocked_tools.iter().cloned())
    }

    pub fn is_approved(&self, category: &str) -> bool {
        self.approvals.contains(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> GuardrailDefaults {
        GuardrailDefaults {
            max_total_steps: 40,
            max_tool_runtime_sec: 120,
        }
    }

    #[test]
    fn test_task_uses_defaults() {
        let task = Task::from_request(TaskRequest::new("list files"), &defaults());
        assert_eq!(task.step_budget, 40);
        assert_eq!(task.per_call_timeout, Duration::from_secs(120));
        assert_eq!(task.time_ceiling(), Duration::from_secs(40 * 120));
        assert!(!task.dry_run);
    }

    #[test]
    fn test_max_steps_overrides_default() {
        let task = Task::from_request(TaskRequest::new("x").max_steps(3).dry_run(true), &defaults());
        assert_eq!(task.step_budget, 3);
        assert!(task.dry_run);
    }

    #[test]
    fn test_options_deserialize() {
        let req: TaskRequest = serde_json::from_value(serde_json::json!({
            "goal": "organize downloads",
            "dry_run": true,
            "options": {"max_steps": 5, "blocked_tools": ["terminal.run"], "profile": "default"}
        }))
        .unwrap();
        assert_eq!(req.options.max_steps, Some(5));
        assert!(req.options.blocked_tools.contains("terminal.run"));
        assert_eq!(req.options.profile.as_deref(), Some("default"));
        assert!(req.options.allowed_tools.is_empty());
    }

    #[test]
    fn test_gate_empty_allows_everything() {
        let gate = ToolGate::default();
        assert!(gate.permits(&["fs.write"]));
    }

    #[test]
    fn test_gate_blocked_wins() {
        let gate = ToolGate::new(vec!["terminal.run".to_string()], vec!["terminal.run".to_string()]);
        assert!(!gate.permits(&["terminal.run"]));
    }

    #[test]
    fn test_gate_checks_every_spelling() {
        let gate = ToolGate::new(Vec::new(), vec!["terminal.run".to_string()]);
        assert!(!gate.permits(&["Terminal_Run", "terminal.run"]));
        assert!(gate.permits(&["fs.listdir"]));
    }

    #[test]
    fn test_gate_allow_list() {
        let gate = ToolGate::new(vec!["fs.listdir".to_string()], Vec::new());
        assert!(gate.permits(&["FS.LISTDIR"]));
        assert!(!gate.permits(&["fs.write"]));
    }
}
