//! Package manager capabilities: pkg.install, pkg.uninstall, pkg.ensure

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::terminal::run_process;
use crate::domain::{Arguments, Observation};
use crate::guardrail::ExecRequest;
use crate::tools::capability::{ArgumentsExt, AsyncCapability, CapabilityInfo, Guard};
use crate::tools::context::CallContext;

const PKG_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_MANAGER: &str = "winget";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PkgAction {
    Install,
    Uninstall,
}

/// Build the package manager invocation, or `None` for an unsupported manager
fn pkg_command(action: PkgAction, args: &Arguments) -> Option<ExecRequest> {
    let id = args.str_arg("id")?;
    let manager = args.str_arg("manager").unwrap_or(DEFAULT_MANAGER);
    let silent = args.bool_arg("silent", true);

    let argv: Vec<String> = match (manager, action) {
        ("winget", PkgAction::Install) => {
            let mut argv = vec!["install".into(), "--id".into(), id.into()];
            if let Some(version) = args.str_arg("version") {
                argv.extend(["--version".to_string(), version.to_string()]);
            }
            if silent {
                argv.extend([
                    "--silent".to_string(),
                    "--accept-package-agreements".to_string(),
                    "--accept-source-agreements".to_string(),
                ]);
            }
            argv
        }
        ("winget", PkgAction::Uninstall) => vec!["uninstall".into(), "--id".into(), id.into(), "--silent".into()],
        ("choco", PkgAction::Install) => vec!["install".into(), id.into(), "-y".into()],
        ("choco", PkgAction::Uninstall) => vec!["uninstall".into(), id.into(), "-y".into()],
        _ => return None,
    };
    Some(ExecRequest::new(manager, argv))
}

fn install_requests(args: &Arguments) -> Result<Vec<ExecRequest>, String> {
    Ok(pkg_command(PkgAction::Install, args).into_iter().collect())
}

fn uninstall_requests(args: &Arguments) -> Result<Vec<ExecRequest>, String> {
    Ok(pkg_command(PkgAction::Uninstall, args).into_iter().collect())
}

async fn run_pkg(action: PkgAction, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
    args.require_str("id")?;
    let Some(request) = pkg_command(action, args) else {
        let manager = args.str_arg("manager").unwrap_or(DEFAULT_MANAGER);
        return Ok(Observation::failure(format!("manager_not_supported:{}", manager)));
    };

    let cmd = std::iter::once(request.binary.as_str())
        .chain(request.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    if ctx.dry_run {
        return Ok(Observation::success_json(json!({"dry_run": true, "cmd": cmd})));
    }

    log::info!("Running package command: {}", cmd);
    let mut argv = vec![request.binary];
    argv.extend(request.args);
    run_process(&argv, None, PKG_TIMEOUT, ctx).await
}

pub struct PkgInstall;

impl CapabilityInfo for PkgInstall {
    fn name(&self) -> &'static str {
        "pkg.install"
    }

    fn description(&self) -> &'static str {
        "Install a package. Args: id, manager (winget|choco), version, silent"
    }

    fn guard(&self) -> Guard {
        Guard::Exec(install_requests)
    }

    fn risk_category(&self, _args: &Arguments) -> Option<&'static str> {
        Some("install")
    }

    fn mutates(&self) -> bool {
        true
    }
}

#[async_trait]
impl AsyncCapability for PkgInstall {
    async fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        run_pkg(PkgAction::Install, args, ctx).await
    }
}

pub struct PkgUninstall;

impl CapabilityInfo for PkgUninstall {
    fn name(&self) -> &'static str {
        "pkg.uninstall"
    }

    fn description(&self) -> &'static str {
        "Uninstall a package. Args: id, manager (winget|choco)"
    }

    fn guard(&self) -> Guard {
        Guard::Exec(uninstall_requests)
    }

    fn risk_category(&self, _args: &Arguments) -> Option<&'static str> {
        Some("install")
    }

    fn mutates(&self) -> bool {
        true
    }
}

#[async_trait]
impl AsyncCapability for PkgUninstall {
    async fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        run_pkg(PkgAction::Uninstall, args, ctx).await
    }
}

/// Install unless already present. Presence is not probed yet, so this installs.
pub struct PkgEnsure;

impl CapabilityInfo for PkgEnsure {
    fn name(&self) -> &'static str {
        "pkg.ensure"
    }

    fn description(&self) -> &'static str {
        "Ensure a package is installed. Args: id, manager (winget|choco), version"
    }

    fn guard(&self) -> Guard {
        Guard::Exec(install_requests)
    }

    fn risk_category(&self, _args: &Arguments) -> Option<&'static str> {
        Some("install")
    }

    fn mutates(&self) -> bool {
        true
    }
}

#[async_trait]
impl AsyncCapability for PkgEnsure {
    async fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        run_pkg(PkgAction::Install, args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::test_support::{args, context};

    #[test]
    fn test_winget_install_command() {
        let req = pkg_command(PkgAction::Install, &args(json!({"id": "Git.Git", "version": "2.0"}))).unwrap();
        assert_eq!(req.binary, "winget");
        assert_eq!(&req.args[..5], ["install", "--id", "Git.Git", "--version", "2.0"]);
        assert!(req.args.contains(&"--silent".to_string()));
    }

    #[test]
    fn test_choco_uninstall_command() {
        let req = pkg_command(PkgAction::Uninstall, &args(json!({"id": "git", "manager": "choco"}))).unwrap();
        assert_eq!(req.binary, "choco");
        assert_eq!(req.args, vec!["uninstall", "git", "-y"]);
    }

    #[test]
    fn test_unsupported_manager() {
        assert!(pkg_command(PkgAction::Install, &args(json!({"id": "x", "manager": "apt"}))).is_none());
        assert!(install_requests(&args(json!({"id": "x", "manager": "apt"}))).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_returns_command() {
        let (_dir, ctx) = context(true);
        let obs = PkgInstall
            .call(&args(json!({"id": "Git.Git", "silent": false})), &ctx)
            .await
            .unwrap();
        assert_eq!(obs.get("cmd"), Some(&json!("winget install --id Git.Git")));
        assert_eq!(obs.get("dry_run"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_unsupported_manager_observation() {
        let (_dir, ctx) = context(true);
        let obs = PkgEnsure
            .call(&args(json!({"id": "x", "manager": "apt"})), &ctx)
            .await
            .unwrap();
        assert_eq!(obs.error(), Some("manager_not_supported:apt"));
    }

    #[tokio::test]
    async fn test_missing_id_is_error() {
        let (_dir, ctx) = context(true);
        assert!(PkgUninstall.call(&Arguments::new(), &ctx).await.is_err());
    }

    #[test]
    fn test_risk_category() {
        assert_eq!(PkgInstall.risk_category(&Arguments::new()), Some("install"));
    }
}
