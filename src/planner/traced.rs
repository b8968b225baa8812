//! TracedPlanner - wraps a planner and keeps a bounded call trace.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use super::{Planner, PlannerError};
use crate::domain::{Observation, PlanStep};
use crate::id::now_ms;

const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    Begin,
    End,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub ts_ms: u64,
    pub call: &'static str,
    pub stage: TraceStage,
    pub detail: String,
}

pub struct TracedPlanner<P> {
    inner: P,
    capacity: usize,
    trace: Mutex<VecDeque<TraceEvent>>,
}

impl<P: Planner> TracedPlanner<P> {
    pub fn new(inner: P) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            trace: Mutex::new(VecDeque::new()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Last `n` trace events, oldest first
    pub fn trace_tail(&self, n: usize) -> Vec<TraceEvent> {
        let Ok(trace) = self.trace.lock() else {
            return Vec::new();
        };
        let skip = trace.len().saturating_sub(n);
        trace.iter().skip(skip).cloned().collect()
    }

    fn record(&self, call: &'static str, stage: TraceStage, detail: impl Into<String>) {
        if let Ok(mut trace) = self.trace.lock() {
            if trace.len() == self.capacity {
                trace.pop_front();
            }
            trace.push_back(TraceEvent {
                ts_ms: now_ms(),
                call,
                stage,
                detail: detail.into(),
            });
        }
    }

    fn finish<T>(&self, call: &'static str, result: &Result<T, PlannerError>, detail: impl FnOnce(&T) -> String) {
        match result {
            Ok(value) => self.record(call, TraceStage::End, detail(value)),
            Err(e) => {
                log::warn!("planner {} failed: {}", call, e);
                self.record(call, TraceStage::Error, e.to_string());
            }
        }
    }
}

#[async_trait]
impl<P: Planner> Planner for TracedPlanner<P> {
    type State = P::State;

    async fn bootstrap(&self, goal: &str, dry_run: bool, budget_hint: Option<u32>) -> Result<P::State, PlannerError> {
        self.record("bootstrap", TraceStage::Begin, format!("dry_run={}", dry_run));
        let result = self.inner.bootstrap(goal, dry_run, budget_hint).await;
        self.finish("bootstrap", &result, |_| String::new());
        result
    }

    async fn next_step(&self, state: &mut P::State) -> Result<Option<PlanStep>, PlannerError> {
        self.record("next", TraceStage::Begin, "");
        let result = self.inner.next_step(state).await;
        self.finish("next", &result, |step| match step {
            Some(step) => step.capability_name.clone(),
            None => "none".to_string(),
        });
        result
    }

    async fn observe(&self, state: &mut P::State, step: &PlanStep, observation: &Observation) -> Result<(), PlannerError> {
        self.record("observe", TraceStage::Begin, step.capability_name.clone());
        let result = self.inner.observe(state, step, observation).await;
        let ok = observation.is_ok();
        self.finish("observe", &result, |_| format!("ok={}", ok));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{Scripted, ScriptedPlanner};
    use serde_json::json;

    #[tokio::test]
    async fn test_records_calls() {
        let planner = TracedPlanner::new(ScriptedPlanner::from_steps([PlanStep::from_json("fs.read", json!({}))]));
        let mut state = planner.bootstrap("g", false, None).await.unwrap();
        let step = planner.next_step(&mut state).await.unwrap().unwrap();
        planner.observe(&mut state, &step, &Observation::failure("x")).await.unwrap();
        planner.next_step(&mut state).await.unwrap();

        let trace = planner.trace_tail(100);
        assert_eq!(trace.len(), 8);
        assert_eq!(trace[3].detail, "fs.read");
        assert_eq!(trace[5].detail, "ok=false");
        assert_eq!(trace[7].detail, "none");
    }

    #[tokio::test]
    async fn test_errors_recorded() {
        let planner = TracedPlanner::new(ScriptedPlanner::new(vec![Scripted::Fail("overloaded".into())]));
        let mut state = planner.bootstrap("g", false, None).await.unwrap();
        assert!(planner.next_step(&mut state).await.is_err());
        let last = planner.trace_tail(1).pop().unwrap();
        assert_eq!(last.stage, TraceStage::Error);
        assert!(last.detail.contains("overloaded"));
    }

    #[tokio::test]
    async fn test_bounded() {
        let planner = TracedPlanner::with_capacity(ScriptedPlanner::silent(), 3);
        let mut state = planner.bootstrap("g", false, None).await.unwrap();
        for _ in 0..5 {
            planner.next_step(&mut state).await.unwrap();
        }
        let trace = planner.trace_tail(10);
        assert_eq!(trace.len(), 3);
        assert!(trace.iter().all(|e| e.call == "next"));
    }
}
