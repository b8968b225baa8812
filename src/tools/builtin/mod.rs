//! Built-in capabilities
//!
//! Filesystem, shell, package, HTTP, JSON and organize capabilities plus the
//! `task.complete` stop signal. [`standard_registry`] wires them all up.

mod complete;
mod data;
mod fs;
mod http;
mod organize;
mod pkg;
mod terminal;

pub use complete::TaskComplete;
pub use data::{JsonRead, JsonWrite};
pub use fs::{FsCopy, FsDelete, FsListdir, FsMove, FsRead, FsWrite, walk_files};
pub use http::HttpRequest;
pub use organize::FilesOrganize;
pub use pkg::{PkgEnsure, PkgInstall, PkgUninstall};
pub use terminal::TerminalRun;

use super::capability::Capability;
use super::registry::CapabilityRegistry;

/// Registry holding every built-in capability
///
/// Filesystem work runs on the blocking pool; process, network and
/// signalling capabilities run as async tasks.
pub fn standard_registry() -> CapabilityRegistry {
    CapabilityRegistry::new()
        .with(Capability::blocking(FsRead))
        .with(Capability::blocking(FsWrite))
        .with(Capability::blocking(FsMove))
        .with(Capability::blocking(FsCopy))
        .with(Capability::blocking(FsDelete))
        .with(Capability::blocking(FsListdir))
        .with(Capability::blocking(JsonRead))
        .with(Capability::blocking(JsonWrite))
        .with(Capability::blocking(FilesOrganize))
        .with(Capability::non_blocking(TerminalRun))
        .with(Capability::non_blocking(PkgInstall))
        .with(Capability::non_blocking(PkgUninstall))
        .with(Capability::non_blocking(PkgEnsure))
        .with(Capability::non_blocking(HttpRequest))
        .with(Capability::non_blocking(TaskComplete))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use serde_json::Value;
    use tempfile::TempDir;

    use crate::domain::{Arguments, Payload};
    use crate::guardrail::{GuardrailConfig, Guardrails};
    use crate::journal::{Journal, JournalScope};
    use crate::tools::context::CallContext;

    pub fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => map,
            other => panic!("arguments must be an object, got {}", other),
        }
    }

    /// Context sandboxed to a fresh temp dir, with a journal inside it
    pub fn context(dry_run: bool) -> (TempDir, CallContext) {
        context_with(dry_run, "")
    }

    /// Same as [`context`] with extra top-level YAML appended to the policy
    pub fn context_with(dry_run: bool, extra_yaml: &str) -> (TempDir, CallContext) {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            "path_sandboxes: ['{}']\n\
             allow_exec: {{ echo: null, sh: null, cat: null, sleep: null, touch: null, wc: null }}\n\
             risk_categories: {{ delete: {{ approval_required: true }} }}\n\
             {}\n",
            dir.path().display(),
            extra_yaml
        );
        let guardrails = Guardrails::new(GuardrailConfig::from_yaml(&yaml).unwrap());
        let journal = Arc::new(Journal::new(dir.path().join("journal")).unwrap());
        let scope = JournalScope::new(journal, "test", Payload::new());
        let ctx = CallContext::new(Arc::new(guardrails), Arc::new(scope)).with_dry_run(dry_run);
        (dir, ctx)
    }
}
