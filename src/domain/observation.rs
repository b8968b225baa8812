//! Observation - the structured result of one capability invocation.
//!
//! Invariants enforced at construction and deserialization:
//! - `error` is present iff `ok` is false
//! - `stop` may only be true when `ok` is true
//!
//! On the wire the payload is flattened next to `ok`/`stop`/`error`, so an
//! observation reads like `{"ok": true, "path": "a.txt", "bytes": 5}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary structured data carried by an observation
pub type Payload = Map<String, Value>;

const RESERVED_KEYS: [&str; 3] = ["ok", "stop", "error"];

/// Result of one capability invocation, fed back to the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawObservation")]
pub struct Observation {
    ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(flatten)]
    payload: Payload,
}

impl Observation {
    /// Successful observation with the given payload
    pub fn success(payload: Payload) -> Self {
        Self {
            ok: true,
            stop: false,
            error: None,
            payload: strip_reserved(payload),
        }
    }

    /// Successful observation built from a JSON value.
    ///
    /// Objects become the payload directly; any other value is stored under `result`.
    pub fn success_json(value: Value) -> Self {
        Self::success(into_payload(value))
    }

    /// Successful observation that also signals the goal has been reached
    pub fn stop(payload: Payload) -> Self {
        Self {
            stop: true,
            ..Self::success(payload)
        }
    }

    /// Failed observation carrying an error string
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            stop: false,
            error: Some(error.into()),
            payload: Payload::new(),
        }
    }

    /// Failed observation that keeps some diagnostic payload (exit codes, stderr)
    pub fn failure_with(error: impl Into<String>, payload: Payload) -> Self {
        Self {
            payload: strip_reserved(payload),
            ..Self::failure(error)
        }
    }

    /// Add a payload field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !RESERVED_KEYS.contains(&key.as_str()) {
            self.payload.insert(key, value.into());
        }
        self
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn is_stop(&self) -> bool {
        self.stop
    }

    /// True when the observation carries a stop signal on a successful call
    pub fn reached_goal(&self) -> bool {
        self.ok && self.stop
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Look up a single payload field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Render as a JSON value (same shape as the serialized form)
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("ok".into(), Value::Bool(self.ok));
        if self.stop {
            out.insert("stop".into(), Value::Bool(true));
        }
        if let Some(error) = &self.error {
            out.insert("error".into(), Value::String(error.clone()));
        }
        for (k, v) in &self.payload {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }
}

fn strip_reserved(mut payload: Payload) -> Payload {
    for key in RESERVED_KEYS {
        payload.remove(key);
    }
    payload
}

fn into_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Payload::new(),
        other => {
            let mut map = Payload::new();
            map.insert("result".into(), other);
            map
        }
    }
}

#[derive(Deserialize)]
struct RawObservation {
    ok: bool,
    #[serde(default)]
    stop: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    payload: Payload,
}

impl TryFrom<RawObservation> for Observation {
    type Error = String;

    fn try_from(raw: RawObservation) -> Result<Self, Self::Error> {
        match (raw.ok, raw.error, raw.stop) {
            (true, Some(_), _) => Err("observation with ok=true must not carry an error".into()),
            (false, None, _) => Err("observation with ok=false must carry an error".into()),
            (false, Some(_), true) => Err("stop may only be set on a successful observation".into()),
            (ok, error, stop) => Ok(Self {
                ok,
                stop,
                error,
                payload: raw.payload,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_has_no_error() {
        let obs = Observation::success_json(json!({"path": "a.txt", "bytes": 5}));
        assert!(obs.is_ok());
        assert!(!obs.is_stop());
        assert!(obs.error().is_none());
        assert_eq!(obs.get("bytes"), Some(&json!(5)));
    }

    #[test]
    fn test_failure_always_has_error() {
        let obs = Observation::failure("tool_error:boom");
        assert!(!obs.is_ok());
        assert_eq!(obs.error(), Some("tool_error:boom"));
        assert!(!obs.reached_goal());
    }

    #[test]
    fn test_payload_cannot_smuggle_reserved_keys() {
        let obs = Observation::success_json(json!({"ok": false, "error": "x", "stop": true, "n": 1}));
        assert!(obs.is_ok());
        assert!(!obs.is_stop());
        assert!(obs.error().is_none());
        assert_eq!(obs.payload().len(), 1);

        let obs = Observation::failure("boom").with("ok", true);
        assert!(!obs.is_ok());
    }

    #[test]
    fn test_scalar_payload_wrapped() {
        let obs = Observation::success_json(json!(42));
        assert_eq!(obs.get("result"), Some(&json!(42)));
    }

    #[test]
    fn test_serialized_shape_is_flat() {
        let obs = Observation::stop(Payload::new()).with("message", "done");
        let value = serde_json::to_value(&obs).unwrap();
        assert_eq!(value, json!({"ok": true, "stop": true, "message": "done"}));
        assert_eq!(obs.to_value(), value);

        let failed = serde_json::to_value(Observation::failure("unknown_tool:x")).unwrap();
        assert_eq!(failed, json!({"ok": false, "error": "unknown_tool:x"}));
    }

    #[test]
    fn test_deserialize_enforces_invariants() {
        let ok: Observation = serde_json::from_value(json!({"ok": true, "entries": []})).unwrap();
        assert!(ok.is_ok());

        assert!(serde_json::from_value::<Observation>(json!({"ok": false})).is_err());
        assert!(serde_json::from_value::<Observation>(json!({"ok": true, "error": "x"})).is_err());
        assert!(serde_json::from_value::<Observation>(json!({"ok": false, "error": "x", "stop": true})).is_err());
    }
}
