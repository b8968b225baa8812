//! Capability definitions
//!
//! A capability is a named operation over a flat argument map that returns an
//! [`Observation`]. Its body is either blocking (runs on a worker thread) or
//! non-blocking (awaited on the runtime); the kind is fixed when the
//! capability is built, never probed per call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::eyre;
use serde_json::Value;

use super::context::CallContext;
use crate::domain::{Arguments, Observation};
use crate::guardrail::{ExecRequest, Guardrails, Verdict, expand_home};

/// Admission check the dispatcher runs before invoking a capability
#[derive(Clone, Copy)]
pub enum Guard {
    /// No admission check
    None,
    /// Sandbox check on each listed argument that holds a path
    Paths(&'static [&'static str]),
    /// Exec allow-list check on the executables the call would run
    Exec(fn(&Arguments) -> Result<Vec<ExecRequest>, String>),
    /// Network allow-list check on the URL in the named argument
    Network { url_arg: &'static str },
    /// Every listed guard must allow; the first denial wins
    All(&'static [Guard]),
}

impl Guard {
    pub fn evaluate(&self, guardrails: &Guardrails, args: &Arguments) -> Verdict {
        match self {
            Guard::None => Verdict::allow("no guard"),
            Guard::Paths(keys) => {
                for key in keys.iter() {
                    if let Some(raw) = args.str_arg(key) {
                        let verdict = guardrails.sandbox_check(&expand_home(Path::new(raw)));
                        if !verdict.allowed {
                            return verdict;
                        }
                    }
                }
                Verdict::allow("paths inside sandbox")
            }
            Guard::Exec(requests) => match requests(args) {
                Ok(requests) => guardrails.exec_all(&requests),
                Err(reason) => Verdict::deny(reason),
            },
            Guard::Network { url_arg } => {
                let Some(raw) = args.str_arg(url_arg) else {
                    return Verdict::deny(format!("missing '{}'", url_arg));
                };
                match reqwest::Url::parse(raw) {
                    Ok(url) => match (url.host_str(), url.port_or_known_default()) {
                        (Some(host), Some(port)) => guardrails.network_check(host, port),
                        _ => Verdict::deny(format!("url has no host/port: {}", raw)),
                    },
                    Err(e) => Verdict::deny(format!("invalid url {}: {}", raw, e)),
                }
            }
            Guard::All(guards) => {
                for guard in guards.iter() {
                    let verdict = guard.evaluate(guardrails, args);
                    if !verdict.allowed {
                        return verdict;
                    }
                }
                Verdict::allow("all guards passed")
            }
        }
    }
}

/// Metadata every capability exposes
pub trait CapabilityInfo: Send + Sync {
    /// Canonical capability name (e.g. `fs.listdir`)
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn guard(&self) -> Guard {
        Guard::None
    }

    /// Risk category this particular call falls under, if any
    fn risk_category(&self, _args: &Arguments) -> Option<&'static str> {
        None
    }

    /// Whether the capability can change durable state
    fn mutates(&self) -> bool {
        false
    }
}

/// Capability whose body blocks the calling thread
pub trait BlockingCapability: CapabilityInfo {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation>;
}

/// Capability whose body suspends cooperatively
#[async_trait]
pub trait AsyncCapability: CapabilityInfo {
    async fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation>;
}

/// Tagged capability body
#[derive(Clone)]
pub enum CapabilityBody {
    Blocking(Arc<dyn BlockingCapability>),
    NonBlocking(Arc<dyn AsyncCapability>),
}

/// A registered capability
#[derive(Clone)]
pub struct Capability {
    body: CapabilityBody,
}

impl Capability {
    pub fn blocking(body: impl BlockingCapability + 'static) -> Self {
        Self {
            body: CapabilityBody::Blocking(Arc::new(body)),
        }
    }

    pub fn non_blocking(body: impl AsyncCapability + 'static) -> Self {
        Self {
            body: CapabilityBody::NonBlocking(Arc::new(body)),
        }
    }

    pub fn body(&self) -> &CapabilityBody {
        &self.body
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.body, CapabilityBody::Blocking(_))
    }

    pub fn name(&self) -> &'static str {
        match &self.body {
            CapabilityBody::Blocking(b) => b.name(),
            CapabilityBody::NonBlocking(b) => b.name(),
        }
    }

    pub fn description(&self) -> &'static str {
        match &self.body {
            CapabilityBody::Blocking(b) => b.description(),
            CapabilityBody::NonBlocking(b) => b.description(),
        }
    }

    pub fn guard(&self) -> Guard {
        match &self.body {
            CapabilityBody::Blocking(b) => b.guard(),
            CapabilityBody::NonBlocking(b) => b.guard(),
        }
    }

    pub fn risk_category(&self, args: &Arguments) -> Option<&'static str> {
        match &self.body {
            CapabilityBody::Blocking(b) => b.risk_category(args),
            CapabilityBody::NonBlocking(b) => b.risk_category(args),
        }
    }

    pub fn mutates(&self) -> bool {
        match &self.body {
            CapabilityBody::Blocking(b) => b.mutates(),
            CapabilityBody::NonBlocking(b) => b.mutates(),
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name())
            .field("blocking", &self.is_blocking())
            .finish()
    }
}

/// Typed accessors over a flat argument map.
///
/// Values parsed from the inline plan language arrive as strings, so the
/// boolean and integer accessors also accept `"true"` or `"42"`.
pub trait ArgumentsExt {
    fn str_arg(&self, key: &str) -> Option<&str>;
    fn require_str(&self, key: &str) -> eyre::Result<&str>;
    fn bool_arg(&self, key: &str, default: bool) -> bool;
    fn u64_arg(&self, key: &str) -> Option<u64>;
    fn path_arg(&self, key: &str) -> eyre::Result<PathBuf>;
}

impl ArgumentsExt for Arguments {
    fn str_arg(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn require_str(&self, key: &str) -> eyre::Result<&str> {
        self.str_arg(key).ok_or_else(|| eyre!("{} is required", key))
    }

    fn bool_arg(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => default,
            },
            _ => default,
        }
    }

    fn u64_arg(&self, key: &str) -> Option<u64> {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn path_arg(&self, key: &str) -> eyre::Result<PathBuf> {
        let raw = self.require_str(key)?;
        Ok(expand_home(Path::new(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::GuardrailConfig;
    use serde_json::json;

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => map,
            _ => Arguments::new(),
        }
    }

    fn guardrails(yaml: &str) -> Guardrails {
        Guardrails::new(GuardrailConfig::from_yaml(yaml).unwrap())
    }

    #[test]
    fn test_arguments_ext() {
        let a = args(json!({"path": "x", "flag": "true", "n": "42", "m": 7, "b": false}));
        assert_eq!(a.str_arg("path"), Some("x"));
        assert!(a.require_str("missing").is_err());
        assert!(a.bool_arg("flag", false));
        assert!(!a.bool_arg("b", true));
        assert!(a.bool_arg("absent", true));
        assert_eq!(a.u64_arg("n"), Some(42));
        assert_eq!(a.u64_arg("m"), Some(7));
        assert_eq!(a.u64_arg("path"), None);
    }

    #[test]
    fn test_paths_guard() {
        let dir = tempfile::tempdir().unwrap();
        let g = guardrails(&format!("path_sandboxes: [\"{}\"]", dir.path().display()));
        let guard = Guard::Paths(&["src", "dst"]);

        let inside = args(json!({"src": dir.path().join("a").to_str().unwrap(), "dst": dir.path().join("b").to_str().unwrap()}));
        assert!(guard.evaluate(&g, &inside).allowed);

        let escaping = args(json!({"src": dir.path().join("a").to_str().unwrap(), "dst": "/etc/x"}));
        assert!(!guard.evaluate(&g, &escaping).allowed);

        // absent keys are left to the body to reject
        assert!(guard.evaluate(&g, &Arguments::new()).allowed);
    }

    #[test]
    fn test_exec_guard() {
        let g = guardrails("allow_exec: { echo: ~ }");
        let guard = Guard::Exec(|a| crate::guardrail::command_segments(a.str_arg("cmd").unwrap_or_default()));
        assert!(guard.evaluate(&g, &args(json!({"cmd": "echo hi"}))).allowed);
        assert!(!guard.evaluate(&g, &args(json!({"cmd": "rm -rf /"}))).allowed);
    }

    #[test]
    fn test_all_guard_first_denial_wins() {
        fn cmd_requests(a: &Arguments) -> Result<Vec<ExecRequest>, String> {
            crate::guardrail::command_segments(a.str_arg("cmd").unwrap_or_default())
        }
        static GUARDS: [Guard; 2] = [Guard::Exec(cmd_requests), Guard::Paths(&["cwd"])];
        let dir = tempfile::tempdir().unwrap();
        let g = guardrails(&format!("path_sandboxes: [\"{}\"]\nallow_exec: {{ echo: ~ }}", dir.path().display()));
        let guard = Guard::All(&GUARDS);

        let inside = args(json!({"cmd": "echo hi", "cwd": dir.path().to_str().unwrap()}));
        assert!(guard.evaluate(&g, &inside).allowed);

        let outside = guard.evaluate(&g, &args(json!({"cmd": "echo hi", "cwd": "/etc"})));
        assert!(outside.reason.starts_with("path outside sandbox"));

        let denied = guard.evaluate(&g, &args(json!({"cmd": "rm x", "cwd": "/etc"})));
        assert_eq!(denied.reason, "exec not allowed: rm");
    }

    #[test]
    fn test_network_guard() {
        let g = guardrails("network_allow: [\"example.com:443\"]");
        let guard = Guard::Network { url_arg: "url" };
        assert!(guard.evaluate(&g, &args(json!({"url": "https://api.example.com/v1"}))).allowed);
        assert!(!guard.evaluate(&g, &args(json!({"url": "http://example.com/"}))).allowed);
        assert!(!guard.evaluate(&g, &args(json!({"url": "not a url"}))).allowed);
        assert!(!guard.evaluate(&g, &Arguments::new()).allowed);
    }
}
