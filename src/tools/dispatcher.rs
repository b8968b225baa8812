//! Dispatcher - resolve, admit, and invoke one capability under a deadline.
//!
//! Blocking bodies run on tokio's blocking pool behind a semaphore so at most
//! `blocking_slots` of them run at once; non-blocking bodies run as spawned
//! tasks. On deadline expiry the awaiting side gives up: a spawned task is
//! aborted, but a blocking body keeps its thread until it returns on its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use super::capability::{Capability, CapabilityBody};
use super::context::{CallContext, ToolFailure};
use super::registry::CapabilityRegistry;
use crate::domain::{Arguments, Observation, Payload, PlanStep};
use crate::guardrail::Guardrails;

/// Default number of blocking bodies allowed to run at once
pub const DEFAULT_BLOCKING_SLOTS: usize = 8;

pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    guardrails: Arc<Guardrails>,
    blocking_slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, guardrails: Arc<Guardrails>) -> Self {
        Self {
            registry,
            guardrails,
            blocking_slots: Arc::new(Semaphore::new(DEFAULT_BLOCKING_SLOTS)),
        }
    }

    /// Bound the worker pool used for blocking bodies (minimum 1)
    pub fn with_blocking_slots(mut self, slots: usize) -> Self {
        self.blocking_slots = Arc::new(Semaphore::new(slots.max(1)));
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn guardrails(&self) -> &Arc<Guardrails> {
        &self.guardrails
    }

    /// Whether a step (or any call inside a batch step) targets a mutating capability
    pub fn mutates(&self, step: &PlanStep) -> bool {
        if step.is_batch() {
            return step
                .batch_calls()
                .map(|calls| calls.iter().any(|c| self.resolves_mutating(&c.capability_name)))
                .unwrap_or(false);
        }
        self.resolves_mutating(&step.capability_name)
    }

    fn resolves_mutating(&self, name: &str) -> bool {
        self.registry.resolve(name).is_some_and(Capability::mutates)
    }

    /// Dispatch a plan step, expanding batch steps into sequential sub-calls
    pub async fn dispatch(&self, step: &PlanStep, timeout: Duration, ctx: &CallContext) -> Observation {
        if step.is_batch() {
            return self.dispatch_batch(step, timeout, ctx).await;
        }
        self.dispatch_call(&step.capability_name, &step.arguments, timeout, ctx).await
    }

    /// Dispatch a single named call; never fails, failures become observations
    pub async fn dispatch_call(&self, name: &str, args: &Arguments, timeout: Duration, ctx: &CallContext) -> Observation {
        match self.try_dispatch(name, args, timeout, ctx).await {
            Ok(observation) => observation,
            Err(failure) => {
                log::debug!("Dispatch of {} failed: {}", name, failure);
                failure.observation()
            }
        }
    }

    async fn try_dispatch(
        &self,
        name: &str,
        args: &Arguments,
        timeout: Duration,
        ctx: &CallContext,
    ) -> Result<Observation, ToolFailure> {
        let capability = self
            .registry
            .resolve(name)
            .ok_or_else(|| ToolFailure::UnknownTool(name.to_string()))?;

        let verdict = capability.guard().evaluate(&self.guardrails, args);
        if !verdict.allowed {
            tracing::warn!(tool = capability.name(), reason = %verdict.reason, "policy blocked");
            return Err(ToolFailure::PolicyBlocked(verdict.reason));
        }

        let started = Instant::now();
        let result = self.invoke(capability, args.clone(), timeout, ctx.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(observation) => {
                tracing::info!(tool = capability.name(), elapsed_ms, ok = observation.is_ok(), "capability finished")
            }
            Err(failure) => tracing::warn!(tool = capability.name(), elapsed_ms, error = %failure, "capability failed"),
        }
        result
    }

    async fn invoke(
        &self,
        capability: &Capability,
        args: Arguments,
        timeout: Duration,
        ctx: CallContext,
    ) -> Result<Observation, ToolFailure> {
        let outcome = match capability.body().clone() {
            CapabilityBody::Blocking(body) => {
                let slots = self.blocking_slots.clone();
                tokio::time::timeout(timeout, async move {
                    let permit = slots
                        .acquire_owned()
                        .await
                        .map_err(|e| ToolFailure::Fault(e.to_string()))?;
                    tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        body.call(&args, &ctx)
                    })
                    .await
                    .map_err(join_failure)
                })
                .await
            }
            CapabilityBody::NonBlocking(body) => {
                let handle = tokio::spawn(async move { body.call(&args, &ctx).await });
                let abort = handle.abort_handle();
                match tokio::time::timeout(timeout, handle).await {
                    Ok(joined) => Ok(joined.map_err(join_failure)),
                    Err(elapsed) => {
                        abort.abort();
                        Err(elapsed)
                    }
                }
            }
        };

        match outcome {
            Err(_) => Err(ToolFailure::Timeout(timeout)),
            Ok(Err(failure)) => Err(failure),
            Ok(Ok(Err(report))) => Err(ToolFailure::Fault(format!("{:#}", report))),
            Ok(Ok(Ok(observation))) => Ok(observation),
        }
    }

    async fn dispatch_batch(&self, step: &PlanStep, timeout: Duration, ctx: &CallContext) -> Observation {
        let calls = match step.batch_calls() {
            Ok(calls) => calls,
            Err(e) => return ToolFailure::Fault(e).observation(),
        };

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let observation = if call.is_batch() {
                ToolFailure::Fault("nested batch calls are not supported".into()).observation()
            } else {
                let resolved = self.registry.resolve(&call.capability_name);
                match ctx
                    .preflight()
                    .check(&call.capability_name, resolved, &call.arguments, &self.guardrails)
                {
                    Ok(()) => {
                        self.dispatch_call(&call.capability_name, &call.arguments, timeout, ctx)
                            .await
                    }
                    Err(failure) => failure.observation(),
                }
            };

            let mut entry = match observation.to_value() {
                Value::Object(fields) => fields,
                _ => Payload::new(),
            };
            // the sub-call's name wins over a payload field of the same name
            entry.insert("name".into(), Value::String(call.capability_name));
            results.push(Value::Object(entry));
        }

        let mut payload = Payload::new();
        payload.insert("results".into(), Value::Array(results));
        Observation::success(payload)
    }
}

fn join_failure(err: JoinError) -> ToolFailure {
    if !err.is_panic() {
        return ToolFailure::Fault("capability task was cancelled".into());
    }
    let panic = err.into_panic();
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ToolFailure::Fault(format!("capability panicked: {}", message))
}
