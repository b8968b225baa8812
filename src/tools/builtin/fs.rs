//! Filesystem capabilities: fs.read, fs.write, fs.move, fs.copy, fs.delete, fs.listdir

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use eyre::{WrapErr, eyre};
use serde_json::json;

use crate::domain::{Arguments, Observation};
use crate::tools::capability::{ArgumentsExt, BlockingCapability, CapabilityInfo, Guard};
use crate::tools::context::CallContext;

pub struct FsRead;

impl CapabilityInfo for FsRead {
    fn name(&self) -> &'static str {
        "fs.read"
    }

    fn description(&self) -> &'static str {
        "Read a text file. Args: path, max_bytes (optional)"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["path"])
    }
}

impl BlockingCapability for FsRead {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let path = args.path_arg("path")?;
        let cap = ctx
            .guardrails()
            .tool_caps("fs.read")
            .and_then(|caps| caps.get("max_bytes"))
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(ctx.max_output_bytes);
        let limit = args.u64_arg("max_bytes").map(|n| (n as usize).min(cap)).unwrap_or(cap);

        let bytes = fs::read(&path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let total = bytes.len();
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let (content, truncated) = ctx.clone().with_max_output(limit).truncate(content);

        Ok(Observation::success_json(json!({
            "path": path.to_string_lossy(),
            "content": content,
            "bytes": total,
            "truncated": truncated,
        })))
    }
}

pub struct FsWrite;

impl CapabilityInfo for FsWrite {
    fn name(&self) -> &'static str {
        "fs.write"
    }

    fn description(&self) -> &'static str {
        "Write text to a file, creating parent directories. Args: path, content, append (default false)"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["path"])
    }

    fn mutates(&self) -> bool {
        true
    }
}

impl BlockingCapability for FsWrite {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let path = args.path_arg("path")?;
        let content = args.str_arg("content").unwrap_or_default();
        let append = args.bool_arg("append", false);

        if !ctx.dry_run {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(!append)
                .open(&path)
                .wrap_err_with(|| format!("failed to open {}", path.display()))?;
            file.write_all(content.as_bytes())?;
        }

        Ok(Observation::success_json(json!({
            "path": path.to_string_lossy(),
            "bytes": content.len(),
            "append": append,
            "dry_run": ctx.dry_run,
        })))
    }
}

pub struct FsMove;

impl CapabilityInfo for FsMove {
    fn name(&self) -> &'static str {
        "fs.move"
    }

    fn description(&self) -> &'static str {
        "Move a file or directory (journaled, undoable). Args: src, dst, overwrite (default false)"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["src", "dst"])
    }

    fn mutates(&self) -> bool {
        true
    }
}

impl BlockingCapability for FsMove {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let src = args.path_arg("src")?;
        let dst = args.path_arg("dst")?;
        let overwrite = args.bool_arg("overwrite", false);

        if !ctx.dry_run {
            if !src.exists() {
                return Err(eyre!("source not found: {}", src.display()));
            }
            if dst.exists() {
                if !overwrite {
                    return Err(eyre!("destination exists: {}", dst.display()));
                }
                remove_path(&dst, true)?;
            }
        }

        let record = ctx.journal().journaled_move(&src, &dst, ctx.dry_run)?;
        Ok(Observation::success_json(json!({
            "src": record.src.to_string_lossy(),
            "dst": record.dst.to_string_lossy(),
            "moved": record.moved,
            "dry_run": ctx.dry_run,
            "op_id": ctx.journal().op_id(),
        })))
    }
}

pub struct FsCopy;

impl CapabilityInfo for FsCopy {
    fn name(&self) -> &'static str {
        "fs.copy"
    }

    fn description(&self) -> &'static str {
        "Copy a file or directory tree. Args: src, dst, overwrite (default true)"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["src", "dst"])
    }

    fn mutates(&self) -> bool {
        true
    }
}

impl BlockingCapability for FsCopy {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let src = args.path_arg("src")?;
        let dst = args.path_arg("dst")?;
        let overwrite = args.bool_arg("overwrite", true);

        if !src.exists() {
            return Err(eyre!("source not found: {}", src.display()));
        }
        if dst.exists() && !overwrite {
            return Err(eyre!("destination exists: {}", dst.display()));
        }

        if !ctx.dry_run {
            if dst.exists() {
                remove_path(&dst, true)?;
            }
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            copy_path(&src, &dst)?;
        }

        Ok(Observation::success_json(json!({
            "src": src.to_string_lossy(),
            "dst": dst.to_string_lossy(),
            "dry_run": ctx.dry_run,
        })))
    }
}

pub struct FsDelete;

impl CapabilityInfo for FsDelete {
    fn name(&self) -> &'static str {
        "fs.delete"
    }

    fn description(&self) -> &'static str {
        "Delete a file or directory. Args: path, recursive (default false)"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["path"])
    }

    fn risk_category(&self, _args: &Arguments) -> Option<&'static str> {
        Some("delete")
    }

    fn mutates(&self) -> bool {
        true
    }
}

impl BlockingCapability for FsDelete {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let path = args.path_arg("path")?;
        let recursive = args.bool_arg("recursive", false);

        if !path.exists() {
            return Ok(Observation::success_json(json!({"deleted": 0, "dry_run": ctx.dry_run})));
        }

        if ctx.dry_run {
            let deleted = if path.is_dir() { walk_files(&path)?.len() } else { 1 };
            return Ok(Observation::success_json(json!({"deleted": deleted, "dry_run": true})));
        }

        if path.is_dir() && !recursive && fs::read_dir(&path)?.next().is_some() {
            return Ok(Observation::failure("dir_not_empty_without_recursive"));
        }
        remove_path(&path, recursive)?;
        Ok(Observation::success_json(json!({"deleted": 1, "dry_run": false})))
    }
}

pub struct FsListdir;

impl CapabilityInfo for FsListdir {
    fn name(&self) -> &'static str {
        "fs.listdir"
    }

    fn description(&self) -> &'static str {
        "List a directory. Args: path, pattern (glob, optional), recursive (default false)"
    }

    fn guard(&self) -> Guard {
        Guard::Paths(&["path"])
    }
}

// Patterns are relative to the listed directory and may not climb out of it
fn pattern_escapes(pattern: &str) -> bool {
    let pattern = Path::new(pattern);
    pattern.has_root()
        || pattern
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}

impl BlockingCapability for FsListdir {
    fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let path = args.path_arg("path")?;
        let recursive = args.bool_arg("recursive", false);

        let entries: Vec<String> = match args.str_arg("pattern") {
            Some(pattern) => {
                if pattern_escapes(pattern) {
                    return Ok(Observation::failure(format!(
                        "policy_blocked:pattern leaves the listed directory: {}",
                        pattern
                    )));
                }
                let full = if recursive {
                    path.join("**").join(pattern)
                } else {
                    path.join(pattern)
                };
                let mut matches = Vec::new();
                for entry in glob::glob(&full.to_string_lossy()).wrap_err("invalid pattern")? {
                    let entry = entry?;
                    // symlinked directories can still lead outside
                    if ctx.guardrails().sandbox_check(&entry).allowed {
                        matches.push(entry.to_string_lossy().into_owned());
                    }
                }
                matches.sort();
                matches
            }
            None => {
                let mut names = Vec::new();
                for entry in fs::read_dir(&path).wrap_err_with(|| format!("failed to list {}", path.display()))? {
                    names.push(entry?.path().to_string_lossy().into_owned());
                }
                names.sort();
                names
            }
        };

        let mut observation = Observation::success_json(json!({
            "path": path.to_string_lossy(),
            "entries": entries,
        }));
        if let Some(pattern) = args.str_arg("pattern") {
            observation = observation.with("pattern", pattern);
        }
        Ok(observation)
    }
}

/// Every regular file under `root`, sorted
pub fn walk_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn remove_path(path: &Path, recursive: bool) -> std::io::Result<()> {
    if path.is_dir() {
        if recursive {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        }
    } else {
        fs::remove_file(path)
    }
}

fn copy_path(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !src.is_dir() {
        return fs::copy(src, dst).map(|_| ());
    }
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        copy_path(&entry.path(), &dst.join(entry.file_name()))?;
    }
    Ok(())
}
