//! Guardrail document loading.
//!
//! The document is YAML with top-level keys `path_sandboxes`,
//! `risk_categories`, `allow_exec`, `network_allow`, `tools` and `defaults`.
//! It is read once at startup; a missing file is fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{PilotError, Result};

/// Per-category approval settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskCategory {
    pub approval_required: bool,
}

/// Allow rule for one executable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecRule {
    /// Package identifiers at least one argument must mention (empty = any)
    #[serde(rename = "ids_allow", alias = "id_allowlist")]
    pub id_allowlist: BTreeSet<String>,
}

/// Budget defaults applied to tasks that do not set their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailDefaults {
    pub max_total_steps: u32,
    pub max_tool_runtime_sec: u64,
}

impl Default for GuardrailDefaults {
    fn default() -> Self {
        Self {
            max_total_steps: 40,
            max_tool_runtime_sec: 120,
        }
    }
}

/// Parsed guardrail document, read-only after load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    #[serde(rename = "path_sandboxes")]
    pub sandbox_roots: Vec<PathBuf>,

    pub risk_categories: BTreeMap<String, RiskCategory>,

    #[serde(rename = "allow_exec", deserialize_with = "exec_rules")]
    pub exec_allow: BTreeMap<String, ExecRule>,

    /// Entries of the form `host:port`
    pub network_allow: BTreeSet<String>,

    #[serde(rename = "tools")]
    pub tool_caps: BTreeMap<String, Map<String, Value>>,

    pub defaults: GuardrailDefaults,
}

// `allow_exec: { git: ~ }` means "allowed, no extra rules"
fn exec_rules<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, ExecRule>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<ExecRule>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(bin, rule)| (bin, rule.unwrap_or_default()))
        .collect())
}

impl GuardrailConfig {
    /// Load from a YAML file. A missing file is an error, never a silent default.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PilotError::Config(format!("guardrail file not found: {}", path.display())));
        }
        let content = fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        log::info!(
            "Loaded guardrails from {} ({} sandbox roots, {} exec rules)",
            path.display(),
            config.sandbox_roots.len(),
            config.exec_allow.len()
        );
        Ok(config)
    }

    /// Parse from a YAML string; an empty document yields defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }
}
