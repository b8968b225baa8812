//! terminal.run - execute a shell command

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use eyre::WrapErr;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::domain::{Arguments, Observation, Payload};
use crate::guardrail::{ExecRequest, command_segments};
use crate::tools::capability::{ArgumentsExt, AsyncCapability, CapabilityInfo, Guard};
use crate::tools::context::CallContext;

const DEFAULT_TIMEOUT_SEC: u64 = 120;

#[cfg(windows)]
const DEFAULT_SHELL: &str = "powershell";
#[cfg(not(windows))]
const DEFAULT_SHELL: &str = "sh";

pub struct TerminalRun;

fn command_arg(args: &Arguments) -> Option<&str> {
    args.str_arg("cmd").or_else(|| args.str_arg("command"))
}

/// Shells `terminal.run` may launch; anything else would bypass the exec allow-list
const SHELLS: [&str; 5] = ["sh", "bash", "powershell", "pwsh", "cmd"];

fn terminal_requests(args: &Arguments) -> Result<Vec<ExecRequest>, String> {
    if let Some(shell) = args.str_arg("shell") {
        if !SHELLS.contains(&shell) {
            return Err(format!("shell not allowed: {}", shell));
        }
    }
    match command_arg(args) {
        Some(cmd) => command_segments(cmd),
        None => Err("cmd is required".to_string()),
    }
}

static TERMINAL_GUARDS: [Guard; 2] = [Guard::Exec(terminal_requests), Guard::Paths(&["cwd"])];

/// Argument vector for running `cmd` under the named shell
fn shell_argv(shell: &str, cmd: &str) -> Vec<String> {
    let mut argv: Vec<String> = match shell.to_lowercase().as_str() {
        "powershell" | "pwsh" => vec![shell.into(), "-NoProfile".into(), "-Command".into()],
        "cmd" => vec!["cmd".into(), "/C".into()],
        _ => vec![shell.into(), "-c".into()],
    };
    argv.push(cmd.to_string());
    argv
}

impl CapabilityInfo for TerminalRun {
    fn name(&self) -> &'static str {
        "terminal.run"
    }

    fn description(&self) -> &'static str {
        "Run a shell command. Args: cmd, shell (sh|bash|powershell|cmd), timeout_sec, cwd"
    }

    fn guard(&self) -> Guard {
        Guard::All(&TERMINAL_GUARDS)
    }

    fn mutates(&self) -> bool {
        true
    }
}

#[async_trait]
impl AsyncCapability for TerminalRun {
    async fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let cmd = command_arg(args).ok_or_else(|| eyre::eyre!("cmd is required"))?;
        let shell = args.str_arg("shell").unwrap_or(DEFAULT_SHELL);

        if ctx.dry_run {
            return Ok(Observation::success_json(json!({"dry_run": true, "cmd": cmd, "shell": shell})));
        }

        let timeout = Duration::from_secs(args.u64_arg("timeout_sec").unwrap_or(DEFAULT_TIMEOUT_SEC));
        let cwd = args.path_arg("cwd").ok();
        let argv = shell_argv(shell, cmd);
        run_process(&argv, cwd.as_deref(), timeout, ctx).await
    }
}

/// Run a program to completion, capturing output.
///
/// Exit status 0 is a successful observation; anything else fails with
/// `exit_code:<n>` and keeps stdout/stderr in the payload. The child is
/// killed if this future is dropped.
pub(super) async fn run_process(
    argv: &[String],
    cwd: Option<&Path>,
    timeout: Duration,
    ctx: &CallContext,
) -> eyre::Result<Observation> {
    let (program, rest) = argv.split_first().ok_or_else(|| eyre::eyre!("empty command"))?;

    let mut command = Command::new(program);
    command
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let child = command.spawn().wrap_err_with(|| format!("failed to spawn {}", program))?;
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => return Ok(Observation::failure(format!("timeout_{}s", timeout.as_secs_f64()))),
    };

    let (stdout, stdout_cut) = ctx.truncate(String::from_utf8_lossy(&output.stdout).into_owned());
    let (stderr, stderr_cut) = ctx.truncate(String::from_utf8_lossy(&output.stderr).into_owned());
    let code = output.status.code();

    let mut payload = Payload::new();
    payload.insert("code".into(), code.map(Value::from).unwrap_or(Value::Null));
    payload.insert("stdout".into(), Value::String(stdout));
    payload.insert("stderr".into(), Value::String(stderr));
    if stdout_cut || stderr_cut {
        payload.insert("truncated".into(), Value::Bool(true));
    }

    if output.status.success() {
        Ok(Observation::success(payload))
    } else {
        let label = code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string());
        Ok(Observation::failure_with(format!("exit_code:{}", label), payload))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::builtin::test_support::{args, context};

    #[test]
    fn test_shell_argv() {
        assert_eq!(shell_argv("sh", "ls"), vec!["sh", "-c", "ls"]);
        assert_eq!(shell_argv("bash", "ls"), vec!["bash", "-c", "ls"]);
        assert_eq!(shell_argv("pwsh", "ls"), vec!["pwsh", "-NoProfile", "-Command", "ls"]);
        assert_eq!(shell_argv("cmd", "dir"), vec!["cmd", "/C", "dir"]);
    }

    #[test]
    fn test_requests_from_cmd() {
        let reqs = terminal_requests(&args(json!({"cmd": "echo a | wc -l"}))).unwrap();
        assert_eq!(reqs.len(), 2);
        assert!(terminal_requests(&Arguments::new()).is_err());
    }

    #[test]
    fn test_shell_override_limited_to_known_shells() {
        let ok = terminal_requests(&args(json!({"cmd": "echo hi", "shell": "bash"})));
        assert!(ok.is_ok());

        for shell in ["python", "/tmp/evil/sh", "rm"] {
            let err = terminal_requests(&args(json!({"cmd": "echo hi", "shell": shell}))).unwrap_err();
            assert_eq!(err, format!("shell not allowed: {}", shell));
        }
    }

    #[test]
    fn test_guard_covers_background_jobs_and_cwd() {
        let (dir, ctx) = context(false);
        let guard = TerminalRun.guard();
        let g = ctx.guardrails();

        let inside = args(json!({"cmd": "echo hi", "cwd": dir.path().to_str().unwrap()}));
        assert!(guard.evaluate(g, &inside).allowed);

        let background = guard.evaluate(g, &args(json!({"cmd": "echo hi & curl http://example.com"})));
        assert_eq!(background.reason, "exec not allowed: curl");

        let cwd = guard.evaluate(g, &args(json!({"cmd": "echo hi", "cwd": "/"})));
        assert!(!cwd.allowed);
    }

    #[tokio::test]
    async fn test_echo() {
        let (_dir, ctx) = context(false);
        let obs = TerminalRun.call(&args(json!({"cmd": "echo hello"})), &ctx).await.unwrap();
        assert!(obs.is_ok());
        assert_eq!(obs.get("code"), Some(&json!(0)));
        assert_eq!(obs.get("stdout").and_then(Value::as_str).map(str::trim), Some("hello"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let (_dir, ctx) = context(false);
        let obs = TerminalRun
            .call(&args(json!({"cmd": "echo oops >&2; exit 3"})), &ctx)
            .await
            .unwrap();
        assert!(!obs.is_ok());
        assert_eq!(obs.error(), Some("exit_code:3"));
        assert!(obs.get("stderr").and_then(Value::as_str).unwrap().contains("oops"));
    }

    #[tokio::test]
    async fn test_cwd() {
        let (dir, ctx) = context(false);
        std::fs::write(dir.path().join("marker.txt"), "found").unwrap();
        let obs = TerminalRun
            .call(&args(json!({"cmd": "cat marker.txt", "cwd": dir.path().to_str().unwrap()})), &ctx)
            .await
            .unwrap();
        assert_eq!(obs.get("stdout"), Some(&json!("found")));
    }

    #[tokio::test]
    async fn test_own_timeout() {
        let (_dir, ctx) = context(false);
        let obs = TerminalRun
            .call(&args(json!({"cmd": "sleep 5", "timeout_sec": 1})), &ctx)
            .await
            .unwrap();
        assert_eq!(obs.error(), Some("timeout_1s"));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_execute() {
        let (dir, ctx) = context(true);
        let marker = dir.path().join("created");
        let cmd = format!("touch {}", marker.display());
        let obs = TerminalRun.call(&args(json!({"cmd": cmd})), &ctx).await.unwrap();
        assert_eq!(obs.get("dry_run"), Some(&json!(true)));
        assert!(!marker.exists());
    }
}
