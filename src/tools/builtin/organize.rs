//! files.organize - rule-based reorganization of a directory tree.
//!
//! Every file under `root` is tested against each rule in order; the first
//! rule that matches a file consumes it. Moves go through the task's journal
//! operation so the whole reorganization can be undone.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{WrapErr, eyre};
use serde::Deserialize;
use serde_json::{Value, json};

use super::fs::walk_files;
use crate::domain::{Arguments, Observation};
use crate::tools::capability::{ArgumentsExt, BlockingCapability, CapabilityInfo, Guard};
use crate::tools::context::CallContext;

const CAPABILITY: &str = "files.organize";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RuleAction {
    Move,
    Copy,
    Delete,
}

#[derive(Debug, Clone, Deserialize)]
struct Rule {
    action: RuleAction,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    when_ext: Vec<String>,
    #[serde(default)]
    when_glob: Option<String>,
}

struct CompiledRule {
    action: RuleAction,
    to: Option<String>,
    exts: Vec<String>,
    glob: Option<glob::Pattern>,
}

impl CompiledRule {
    fn compile(index: usize, rule: Rule) -> eyre::Result<Self> {
        if rule.action != RuleAction::Delete && rule.to.is_none() {
            return Err(eyre!("rule {} needs a 'to' directory", index));
        }
        let glob = rule
            .when_glob
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .wrap_err_with(|| format!("rule {} has an invalid glob", index))?;
        Ok(Self {
            action: rule.action,
            to: rule.to,
            exts: rule.when_ext.iter().map(|e| normalize_ext(e)).collect(),
            glob,
        })
    }

    fn matches(&self, file: &Path) -> bool {
        if !self.exts.is_empty() {
            let ext = file
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !self.exts.contains(&ext) {
                return false;
            }
        }
        match (&self.glob, file.file_name()) {
            (Some(pattern), Some(name)) => pattern.matches(&name.to_string_lossy()),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

fn parse_rules(args: &Arguments) -> eyre::Result<Vec<Rule>> {
    let raw = args.get("rules").cloned().ok_or_else(|| eyre!("rules is required"))?;
    serde_json::from_value(raw).wrap_err("rules must be a list of {action, to, when_ext, when_glob}")
}

fn has_delete_rule(args: &Arguments) -> bool {
    args.get("rules")
        .and_then(Value::as_array)
        .is_some_and(|rules| {
            rules
                .iter()
                .any(|r| r.get("action").and_then(Value::as_str).is_some_and(|a| a.eq_ignore_ascii_case("delete")))
        })
}

pub struct FilesOrganize;

impl CapabilityInfo for FilesOrganize {
    fn name(&self) -> &'static str {
        CAPABILITY
    }

    fn description(&self) -> &'static str {
        "Reorganize files under root by rules. Args: root, rules: [{action: move|copy|delete, to, when_ext, when_glob}]"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["root"])
    }

    fn risk_category(&self, args: &Arguments) -> Option<&'static str> {
        has_delete_rule(args).then_some("delete")
    }

    fn mutates(&self) -> bool {
        true
    }
}

impl BlockingCapability for FilesOrganize {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let root = std::path::absolute(args.path_arg("root")?)?;
        let rules = parse_rules(args)?
            .into_iter()
            .enumerate()
            .map(|(i, rule)| CompiledRule::compile(i, rule))
            .collect::<eyre::Result<Vec<_>>>()?;

        if rules.iter().any(|r| r.action == RuleAction::Delete) && !ctx.guardrails().tool_flag(CAPABILITY, "allow_delete") {
            return Ok(Observation::failure("policy_blocked:delete_not_allowed_by_policy"));
        }
        if !root.is_dir() {
            return Err(eyre!("root is not a directory: {}", root.display()));
        }

        let files = walk_files(&root).wrap_err_with(|| format!("failed to walk {}", root.display()))?;
        let mut consumed: HashSet<PathBuf> = HashSet::new();
        let mut actions = Vec::new();

        for rule in &rules {
            for file in &files {
                if consumed.contains(file) || !rule.matches(file) {
                    continue;
                }

                match (rule.action, rule.to.as_deref()) {
                    (RuleAction::Delete, _) => {
                        if !ctx.dry_run {
                            fs::remove_file(file).wrap_err_with(|| format!("failed to delete {}", file.display()))?;
                        }
                        actions.push(format!("delete {}", file.display()));
                    }
                    (action, Some(to)) => {
                        let Some(name) = file.file_name() else { continue };
                        let dst = root.join(to).join(name);
                        if dst == *file {
                            continue;
                        }
                        let verdict = ctx.guardrails().sandbox_check(&dst);
                        if !verdict.allowed {
                            return Ok(Observation::failure(format!("policy_blocked:{}", verdict.reason)));
                        }

                        if action == RuleAction::Move {
                            ctx.journal().journaled_move(file, &dst, ctx.dry_run)?;
                            actions.push(format!("move {} -> {}", file.display(), dst.display()));
                        } else {
                            if !ctx.dry_run {
                                if let Some(parent) = dst.parent() {
                                    fs::create_dir_all(parent)?;
                                }
                                fs::copy(file, &dst).wrap_err_with(|| format!("failed to copy {}", file.display()))?;
                            }
                            actions.push(format!("copy {} -> {}", file.display(), dst.display()));
                        }
                    }
                    (_, None) => continue,
                }
                consumed.insert(file.clone());
            }
        }

        log::info!("files.organize {}: {} file(s) affected (dry_run={})", root.display(), actions.len(), ctx.dry_run);
        Ok(Observation::success_json(json!({
            "root": root.to_string_lossy(),
            "affected": actions.len(),
            "actions": actions,
            "dry_run": ctx.dry_run,
            "op_id": ctx.journal().op_id(),
        })))
    }
}
