//! Orchestrator - runs one task's planner/dispatch loop.
//!
//! Each iteration asks the planner for a step, gates it against the task's
//! allow/deny lists and approvals, dispatches it under the per-call deadline
//! and feeds the observation back. Capability failures never end the loop;
//! only planner failures, silence or an exhausted budget do.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::events::{EventSink, RunEvent};
use crate::domain::{Payload, PlanStep, RunLimits, RunReport, StepRecord, Task, TerminatedReason};
use crate::journal::{EventKind, Journal, JournalScope};
use crate::planner::{Planner, goal_option, parse_inline_plan};
use crate::tools::{CallContext, DEFAULT_MAX_OUTPUT_BYTES, Dispatcher};

pub struct Orchestrator<P: Planner> {
    planner: Arc<P>,
    dispatcher: Arc<Dispatcher>,
    journal: Arc<Journal>,
    max_output_bytes: usize,
}

/// Mutable bookkeeping for one run
struct RunState<'a> {
    task: &'a Task,
    scope: Arc<JournalScope>,
    steps: Vec<StepRecord>,
    events: EventSink,
}

impl RunState<'_> {
    async fn finish(mut self, reason: TerminatedReason, detail: Option<String>) -> RunReport {
        let op_id = self.scope.op_id();
        tracing::info!(reason = reason.as_str(), steps = self.steps.len(), op_id = ?op_id, "task finished");
        self.events
            .emit(RunEvent::Finished {
                reason,
                steps: self.steps.len(),
                op_id: op_id.clone(),
            })
            .await;

        RunReport {
            goal: self.task.goal.clone(),
            dry_run: self.task.dry_run,
            steps: self.steps,
            terminated_reason: reason,
            detail,
            op_id,
            limits: RunLimits {
                max_steps: self.task.step_budget,
                per_call_timeout_ms: self.task.per_call_timeout.as_millis() as u64,
            },
        }
    }
}

impl<P: Planner> Orchestrator<P> {
    pub fn new(planner: Arc<P>, dispatcher: Arc<Dispatcher>, journal: Arc<Journal>) -> Self {
        Self {
            planner,
            dispatcher,
            journal,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run a task to completion or cutoff
    pub async fn run(&self, task: &Task) -> RunReport {
        self.execute(task, None).await
    }

    /// Run a task, reporting progress through `events`
    pub async fn run_with_events(&self, task: &Task, events: mpsc::Sender<RunEvent>) -> RunReport {
        self.execute(task, Some(events)).await
    }

    async fn execute(&self, task: &Task, events: Option<mpsc::Sender<RunEvent>>) -> RunReport {
        let started = Instant::now();
        let ceiling = task.time_ceiling();

        let mut meta = Payload::new();
        meta.insert("goal".into(), Value::String(task.goal.clone()));
        meta.insert("dry_run".into(), Value::Bool(task.dry_run));
        let scope = Arc::new(JournalScope::new(self.journal.clone(), "task", meta));

        let mut ctx = CallContext::for_task(task, self.dispatcher.guardrails().clone(), scope.clone())
            .with_max_output(self.max_output_bytes);
        if ctx.profile.is_none() {
            ctx.profile = goal_option(&task.goal, "profile");
        }

        let mut run = RunState {
            task,
            scope,
            steps: Vec::new(),
            events: EventSink::new(events),
        };
        run.events
            .emit(RunEvent::Started {
                goal: task.goal.clone(),
                dry_run: task.dry_run,
                max_steps: task.step_budget,
                per_call_timeout_ms: task.per_call_timeout.as_millis() as u64,
            })
            .await;
        tracing::info!(max_steps = task.step_budget, dry_run = task.dry_run, "task started");

        let mut state = match self.planner.bootstrap(&task.goal, task.dry_run, task.budget_hint).await {
            Ok(state) => state,
            Err(e) => {
                log::error!("Planner bootstrap failed: {}", e);
                return run.finish(TerminatedReason::PlannerBootstrapFailed, Some(e.to_string())).await;
            }
        };

        let mut fallback: VecDeque<PlanStep> = VecDeque::new();

        for iteration in 0..task.step_budget {
            if started.elapsed() >= ceiling {
                log::warn!("Time ceiling of {:?} reached after {} step(s)", ceiling, iteration);
                break;
            }
            let step_no = iteration + 1;

            let step = match fallback.pop_front() {
                Some(step) => step,
                None => match planner_within(ceiling, started, self.planner.next_step(&mut state)).await {
                    None => {
                        log::warn!("Planner still choosing step {} when the {:?} ceiling ran out", step_no, ceiling);
                        break;
                    }
                    Some(Ok(Some(step))) => {
                        run.events
                            .emit(RunEvent::PlannerStep {
                                step: step_no,
                                capability: step.capability_name.clone(),
                                call_id: step.call_id.clone(),
                            })
                            .await;
                        step
                    }
                    Some(Ok(None)) => {
                        if iteration == 0 {
                            fallback = parse_inline_plan(&task.goal).into();
                        }
                        let Some(step) = fallback.pop_front() else {
                            log::info!("Planner returned no step; ending");
                            return run.finish(TerminatedReason::PlannerSilent, None).await;
                        };
                        log::info!("Planner silent; running {} inline step(s) from the goal", fallback.len() + 1);
                        run.events.emit(RunEvent::FallbackPlan { count: fallback.len() + 1 }).await;
                        step
                    }
                    Some(Err(e)) => {
                        log::error!("Planner failed to choose a step: {}", e);
                        return run.finish(TerminatedReason::PlannerError, Some(e.to_string())).await;
                    }
                },
            };

            tracing::info!(step = step_no, tool = %step.capability_name, "dispatching step");
            log::debug!("step {} arguments: {}", step_no, Value::Object(step.arguments.clone()));

            let observation = match self.admit(&step, &ctx) {
                Err(denial) => {
                    tracing::warn!(step = step_no, tool = %step.capability_name, error = %denial, "step refused");
                    denial.observation()
                }
                Ok(()) => {
                    run.events
                        .emit(RunEvent::Dispatch {
                            step: step_no,
                            capability: step.capability_name.clone(),
                            arguments: step.arguments.clone(),
                        })
                        .await;
                    self.dispatch_step(&step, task, &ctx, &run.scope).await
                }
            };

            run.events
                .emit(RunEvent::Observed {
                    step: step_no,
                    capability: step.capability_name.clone(),
                    observation: observation.clone(),
                })
                .await;

            let observed = planner_within(ceiling, started, self.planner.observe(&mut state, &step, &observation)).await;
            let reached_goal = observation.reached_goal();
            run.steps.push(StepRecord {
                capability_name: step.capability_name,
                arguments: step.arguments,
                observation,
            });

            match observed {
                None => {
                    log::warn!("Planner still observing step {} when the {:?} ceiling ran out", step_no, ceiling);
                    break;
                }
                Some(Err(e)) => {
                    log::error!("Planner failed to observe step {}: {}", step_no, e);
                    return run.finish(TerminatedReason::PlannerError, Some(e.to_string())).await;
                }
                Some(Ok(())) => {}
            }
            if reached_goal {
                run.events.emit(RunEvent::StopSignal { step: step_no }).await;
                return run.finish(TerminatedReason::GoalReached, None).await;
            }
        }

        run.finish(TerminatedReason::BudgetExhausted, None).await
    }

    /// Allow/deny lists and approvals; batch steps are checked per sub-call
    fn admit(&self, step: &PlanStep, ctx: &CallContext) -> Result<(), crate::tools::ToolFailure> {
        if step.is_batch() {
            return Ok(());
        }
        let resolved = self.dispatcher.registry().resolve(&step.capability_name);
        ctx.preflight()
            .check(&step.capability_name, resolved, &step.arguments, self.dispatcher.guardrails())
    }

    async fn dispatch_step(
        &self,
        step: &PlanStep,
        task: &Task,
        ctx: &CallContext,
        scope: &JournalScope,
    ) -> crate::domain::Observation {
        let mutating = self.dispatcher.mutates(step);
        if mutating && let Err(e) = scope.ensure() {
            log::warn!("Could not open journal operation: {}", e);
        }

        let observation = self.dispatcher.dispatch(step, task.per_call_timeout, ctx).await;

        if mutating {
            let payload = json!({
                "capability": step.capability_name,
                "ok": observation.is_ok(),
                "error": observation.error(),
            });
            if let Value::Object(payload) = payload
                && let Err(e) = scope.append(EventKind::StepDone, payload)
            {
                log::warn!("Failed to journal step {}: {}", step.capability_name, e);
            }
        }
        observation
    }
}

/// Await a planner call for whatever is left of the time ceiling; `None` once it runs out
async fn planner_within<F: Future>(ceiling: Duration, started: Instant, call: F) -> Option<F::Output> {
    let remaining = ceiling.saturating_sub(started.elapsed());
    tokio::time::timeout(remaining, call).await.ok()
}
