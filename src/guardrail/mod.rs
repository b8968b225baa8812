//! Guardrail engine
//!
//! Admission checks applied before a capability body runs:
//! - sandbox: mutating paths must resolve inside a configured root
//! - exec: executables must be allow-listed, optionally per package id
//! - network: `host:port` must match (or be a subdomain of) an allowed entry
//! - approval: risk categories that need an explicit user approval
//!
//! The engine is built once from a loaded [`GuardrailConfig`] and never
//! mutated afterwards; every check is a pure function safe to call from
//! many tasks at once.

mod config;
mod exec;
mod sandbox;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

pub use config::{ExecRule, GuardrailConfig, GuardrailDefaults, RiskCategory};
pub use exec::{ExecRequest, binary_key, command_segments};
pub(crate) use exec::split_words;
pub use sandbox::{expand_home, resolve_path};

use crate::error::Result;

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
}

impl Verdict {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.allowed { "allowed" } else { "denied" };
        write!(f, "{}: {}", label, self.reason)
    }
}

/// Read-only policy evaluator over a loaded guardrail document
#[derive(Debug, Clone)]
pub struct Guardrails {
    config: GuardrailConfig,
    roots: Vec<PathBuf>,
    exec_rules: BTreeMap<String, ExecRule>,
}

impl Guardrails {
    pub fn new(config: GuardrailConfig) -> Self {
        let roots = config
            .sandbox_roots
            .iter()
            .filter_map(|root| match resolve_path(root) {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    log::warn!("Ignoring sandbox root {}: {}", root.display(), e);
                    None
                }
            })
            .collect();

        let exec_rules = config
            .exec_allow
            .iter()
            .map(|(bin, rule)| (binary_key(bin), rule.clone()))
            .collect();

        Self {
            config,
            roots,
            exec_rules,
        }
    }

    /// Load the guardrail document; a missing file is an error
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(GuardrailConfig::load(path)?))
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Sandbox roots after resolution
    pub fn sandbox_roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Allowed iff the resolved path lies inside one of the sandbox roots
    pub fn sandbox_check(&self, target: &Path) -> Verdict {
        let resolved = match resolve_path(target) {
            Ok(resolved) => resolved,
            Err(e) => return Verdict::deny(format!("unresolvable path: {}", e)),
        };

        match self.roots.iter().find(|root| resolved.starts_with(root)) {
            Some(root) => Verdict::allow(format!("inside sandbox {}", root.display())),
            None => Verdict::deny(format!("path outside sandbox: {}", resolved.display())),
        }
    }

    /// Allowed iff the binary is listed and, when it carries an id allowlist,
    /// some argument mentions an allowed id
    pub fn exec_check(&self, binary: &str, args: &[String]) -> Verdict {
        let key = binary_key(binary);
        let Some(rule) = self.exec_rules.get(&key) else {
            return Verdict::deny(format!("exec not allowed: {}", key));
        };

        if rule.id_allowlist.is_empty() {
            return Verdict::allow(format!("exec allowed: {}", key));
        }

        let matched = args
            .iter()
            .find_map(|arg| rule.id_allowlist.iter().find(|id| arg.contains(id.as_str())));
        match matched {
            Some(id) => Verdict::allow(format!("exec allowed: {} ({})", key, id)),
            None => Verdict::deny(format!("package id not in allowlist for {}", key)),
        }
    }

    /// Check every executable a shell command line would run
    pub fn command_check(&self, command: &str) -> Verdict {
        match command_segments(command) {
            Ok(requests) => self.exec_all(&requests),
            Err(e) => Verdict::deny(e),
        }
    }

    /// First denial wins; all allowed otherwise
    pub fn exec_all(&self, requests: &[ExecRequest]) -> Verdict {
        for request in requests {
            let verdict = self.exec_check(&request.binary, &request.args);
            if !verdict.allowed {
                return verdict;
            }
        }
        Verdict::allow(format!("{} command(s) allowed", requests.len()))
    }

    /// Allowed iff `host:port` equals an allowed entry or is a subdomain of one
    pub fn network_check(&self, host: &str, port: u16) -> Verdict {
        let target = format!("{}:{}", host.to_lowercase(), port);
        let matched = self.config.network_allow.iter().find(|entry| {
            let entry = entry.to_lowercase();
            target == entry || target.ends_with(&format!(".{}", entry))
        });
        match matched {
            Some(entry) => Verdict::allow(format!("network allowed by {}", entry)),
            None => Verdict::deny(format!("network not allowed: {}", target)),
        }
    }

    pub fn approval_required(&self, category: &str) -> bool {
        self.config
            .risk_categories
            .get(category)
            .is_some_and(|c| c.approval_required)
    }

    /// Capability-specific caps from the `tools` section
    pub fn tool_caps(&self, tool: &str) -> Option<&Map<String, Value>> {
        self.config.tool_caps.get(tool)
    }

    /// Boolean cap lookup; absent or non-boolean reads as false
    pub fn tool_flag(&self, tool: &str, key: &str) -> bool {
        self.tool_caps(tool)
            .and_then(|caps| caps.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn defaults(&self) -> GuardrailDefaults {
        self.config.defaults
    }
}
