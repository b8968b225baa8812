//! Run outcome types.
//!
//! This module defines the result types for one task run.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::observation::Observation;
use super::plan::Arguments;

/// Why the step loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatedReason {
    /// A successful observation carried the stop signal
    GoalReached,
    /// Step or wall-clock budget ran out
    BudgetExhausted,
    /// Planner could not initialize the conversation
    PlannerBootstrapFailed,
    /// Planner raised while choosing or observing a step
    PlannerError,
    /// Planner returned nothing and no fallback plan applied
    PlannerSilent,
}

impl TerminatedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoalReached => "goal_reached",
            Self::BudgetExhausted => "budget_exhausted",
            Self::PlannerBootstrapFailed => "planner_bootstrap_failed",
            Self::PlannerError => "planner_error",
            Self::PlannerSilent => "planner_silent",
        }
    }

    /// Only `GoalReached` is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::GoalReached)
    }
}

impl fmt::Display for TerminatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed (or refused) step in the run history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub capability_name: String,
    pub arguments: Arguments,
    pub observation: Observation,
}

/// Budgets the run was held to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    pub max_steps: u32,
    pub per_call_timeout_ms: u64,
}

/// Final result of a task run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub goal: String,
    pub dry_run: bool,
    pub steps: Vec<StepRecord>,
    pub terminated_reason: TerminatedReason,
    /// Planner error message for planner-level terminations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Journal operation opened for this run, if any capability mutated state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_id: Option<String>,
    pub limits: RunLimits,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.terminated_reason.is_success()
    }

    /// Steps whose observation failed
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| !s.observation.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(TerminatedReason::GoalReached.to_string(), "goal_reached");
        assert_eq!(TerminatedReason::PlannerBootstrapFailed.as_str(), "planner_bootstrap_failed");
        assert_eq!(
            serde_json::to_value(TerminatedReason::BudgetExhausted).unwrap(),
            serde_json::json!("budget_exhausted")
        );
    }

    #[test]
    fn test_only_goal_reached_is_success() {
        assert!(TerminatedReason::GoalReached.is_success());
        assert!(!TerminatedReason::PlannerSilent.is_success());
        assert!(!TerminatedReason::BudgetExhausted.is_success());
    }

    #[test]
    fn test_failed_steps() {
        let report = RunReport {
            goal: "g".into(),
            dry_run: false,
            steps: vec![
                StepRecord {
                    capability_name: "fs.listdir".into(),
                    arguments: Arguments::new(),
                    observation: Observation::success_json(serde_json::json!({"entries": []})),
                },
                StepRecord {
                    capability_name: "nope".into(),
                    arguments: Arguments::new(),
                    observation: Observation::failure("unknown_tool:nope"),
                },
            ],
            terminated_reason: TerminatedReason::PlannerSilent,
            detail: None,
            op_id: None,
            limits: RunLimits {
                max_steps: 5,
                per_call_timeout_ms: 1000,
            },
        };
        assert_eq!(report.failed_steps().count(), 1);
        assert!(!report.succeeded());
    }
}
