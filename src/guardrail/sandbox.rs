//! Path resolution for sandbox containment checks.
//!
//! Paths are resolved without requiring the target to exist: `.` and `..`
//! are folded lexically, and every existing symlink along the way is
//! followed, so a link inside a root that points outside it resolves to
//! its real location.

use std::fs;
use std::path::{Component, Path, PathBuf};

const MAX_LINK_DEPTH: usize = 40;

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Resolve a path to an absolute, symlink-free form.
///
/// The target itself (and any trailing components) may not exist yet.
pub fn resolve_path(path: &Path) -> Result<PathBuf, String> {
    if path.as_os_str().to_string_lossy().contains('\0') {
        return Err("path contains a null byte".to_string());
    }
    let expanded = expand_home(path);
    let absolute = std::path::absolute(&expanded).map_err(|e| format!("cannot resolve {}: {}", path.display(), e))?;
    resolve_components(&absolute, 0)
}

fn resolve_components(path: &Path, depth: usize) -> Result<PathBuf, String> {
    if depth > MAX_LINK_DEPTH {
        return Err(format!("too many symlink levels resolving {}", path.display()));
    }

    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                let is_link = fs::symlink_metadata(&resolved)
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false);
                if is_link {
                    let target = fs::read_link(&resolved).map_err(|e| e.to_string())?;
                    let base = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
                    resolved = resolve_components(&base.join(target), depth + 1)?;
                }
            }
        }
    }
    Ok(resolved)
}
