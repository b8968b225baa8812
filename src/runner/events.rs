//! Progress events emitted while a task runs.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::{Arguments, Observation, TerminatedReason};

/// One step-loop event, serialized as `{"evt": "...", ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "evt", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        goal: String,
        dry_run: bool,
        max_steps: u32,
        per_call_timeout_ms: u64,
    },
    PlannerStep {
        step: u32,
        capability: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
    FallbackPlan {
        count: usize,
    },
    Dispatch {
        step: u32,
        capability: String,
        arguments: Arguments,
    },
    Observed {
        step: u32,
        capability: String,
        observation: Observation,
    },
    StopSignal {
        step: u32,
    },
    Finished {
        reason: TerminatedReason,
        steps: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        op_id: Option<String>,
    },
}

/// Optional event sink; a dropped receiver is ignored
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<RunEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Option<mpsc::Sender<RunEvent>>) -> Self {
        Self { tx }
    }

    pub(crate) async fn emit(&mut self, event: RunEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).await.is_err() {
            log::debug!("Run event receiver closed; dropping further events");
            self.tx = None;
        }
    }
}
