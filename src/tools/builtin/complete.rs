//! task.complete - signal that the goal has been reached

use async_trait::async_trait;

use crate::domain::{Arguments, Observation, Payload};
use crate::tools::capability::{ArgumentsExt, AsyncCapability, CapabilityInfo};
use crate::tools::context::CallContext;

pub struct TaskComplete;

impl CapabilityInfo for TaskComplete {
    fn name(&self) -> &'static str {
        "task.complete"
    }

    fn description(&self) -> &'static str {
        "Mark the task as done and stop the loop. Args: summary (optional)"
    }
}

#[async_trait]
impl AsyncCapability for TaskComplete {
    async fn call(&self, args: &Arguments, _ctx: &CallContext) -> eyre::Result<Observation> {
        let summary = args.str_arg("summary").or_else(|| args.str_arg("message")).unwrap_or("done");
        Ok(Observation::stop(Payload::new()).with("summary", summary))
    }
}
