//! JSON document capabilities: data.json.read, data.json.write

use std::fs;

use eyre::WrapErr;
use serde_json::{Value, json};

use crate::domain::{Arguments, Observation};
use crate::tools::capability::{ArgumentsExt, BlockingCapability, CapabilityInfo, Guard};
use crate::tools::context::CallContext;

pub struct JsonRead;

impl CapabilityInfo for JsonRead {
    fn name(&self) -> &'static str {
        "data.json.read"
    }

    fn description(&self) -> &'static str {
        "Parse a JSON file. Args: path"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["path"])
    }
}

impl BlockingCapability for JsonRead {
    fn call(&self, args: &Arguments, _ctx: &CallContext) -> eyre::Result<Observation> {
        let path = args.path_arg("path")?;
        let content = fs::read_to_string(&path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let data: Value = serde_json::from_str(&content).wrap_err_with(|| format!("invalid JSON in {}", path.display()))?;
        Ok(Observation::success_json(json!({"path": path.to_string_lossy(), "data": data})))
    }
}

pub struct JsonWrite;

impl CapabilityInfo for JsonWrite {
    fn name(&self) -> &'static str {
        "data.json.write"
    }

    fn description(&self) -> &'static str {
        "Write a value as pretty-printed JSON. Args: path, data"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["path"])
    }

    fn mutates(&self) -> bool {
        true
    }
}

impl BlockingCapability for JsonWrite {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let path = args.path_arg("path")?;
        let data = args.get("data").cloned().unwrap_or(Value::Null);
        let rendered = serde_json::to_string_pretty(&data)?;

        if !ctx.dry_run {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &rendered).wrap_err_with(|| format!("failed to write {}", path.display()))?;
        }

        Ok(Observation::success_json(json!({
            "path": path.to_string_lossy(),
            "bytes": rendered.len(),
            "dry_run": ctx.dry_run,
        })))
    }
}
