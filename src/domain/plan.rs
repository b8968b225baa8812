//! PlanStep - one capability call chosen by the planner.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat, ordered argument map passed to a capability
pub type Arguments = Map<String, Value>;

/// Reserved capability name for a step that bundles several independent calls
pub const BATCH_CAPABILITY: &str = "batch";

/// One capability name plus arguments, consumed exactly once by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Capability the planner asked for (as spelled by the planner)
    #[serde(alias = "name", alias = "tool")]
    pub capability_name: String,

    /// Argument map (insertion order preserved)
    #[serde(default, alias = "args")]
    pub arguments: Arguments,

    /// Correlation id the planner uses to match this call with its observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl PlanStep {
    pub fn new(capability_name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            capability_name: capability_name.into(),
            arguments,
            call_id: None,
        }
    }

    /// Build a step from a JSON object of arguments.
    ///
    /// Non-object values produce an empty argument map.
    pub fn from_json(capability_name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Arguments::new(),
        };
        Self::new(capability_name, arguments)
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Bundle several calls into a single batch step
    pub fn batch(calls: Vec<PlanStep>) -> Self {
        let calls: Vec<Value> = calls
            .into_iter()
            .map(|step| {
                serde_json::json!({
                    "name": step.capability_name,
                    "arguments": Value::Object(step.arguments),
                })
            })
            .collect();
        let mut arguments = Arguments::new();
        arguments.insert("calls".into(), Value::Array(calls));
        Self::new(BATCH_CAPABILITY, arguments)
    }

    pub fn is_batch(&self) -> bool {
        self.capability_name.eq_ignore_ascii_case(BATCH_CAPABILITY)
    }

    /// Expand a batch step into its sub-calls, in order
    pub fn batch_calls(&self) -> Result<Vec<PlanStep>, String> {
        let calls = self
            .arguments
            .get("calls")
            .and_then(Value::as_array)
            .ok_or_else(|| "batch requires a 'calls' array".to_string())?;

        calls
            .iter()
            .enumerate()
            .map(|(i, call)| {
                serde_json::from_value::<PlanStep>(call.clone())
                    .map_err(|e| format!("batch call {} is malformed: {}", i, e))
            })
            .collect()
    }
}
