//! Locate the real executable for a tool name
//!
//! Walks the search path like a shell would, but never returns anything
//! from the shim directory: a shim that resolved to itself would recurse
//! forever.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::paths;

/// Error type for resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NotFound { tool: String },
    InvalidName { tool: String },
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NotFound { tool } => {
                write!(f, "{}: not found in search path (excluding shims)", tool)
            }
            ResolveError::InvalidName { tool } => write!(f, "invalid tool name: {:?}", tool),
        }
    }
}

impl std::error::Error for ResolveError {}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Resolve `tool` against the current `PATH`, skipping the shim directory.
pub fn resolve(tool: &str) -> Result<PathBuf> {
    let search = std::env::var_os("PATH").unwrap_or_default();
    resolve_in(tool, &search, &paths::shim_dir())
}

/// Resolve `tool` against an explicit search list and shim directory.
pub fn resolve_in(tool: &str, search: &OsString, shim_dir: &Path) -> Result<PathBuf> {
    if tool.is_empty() || tool.contains('/') || tool.contains(std::path::MAIN_SEPARATOR) {
        return Err(ResolveError::InvalidName {
            tool: tool.to_string(),
        });
    }

    let shim_dir = paths::clean(shim_dir);
    // Also catch the shim dir reached through a symlinked PATH entry.
    let shim_real = std::fs::canonicalize(&shim_dir).ok();
    for dir in std::env::split_paths(search) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let dir = paths::clean(&dir);
        if dir == shim_dir {
            continue;
        }
        if shim_real.is_some() && std::fs::canonicalize(&dir).ok() == shim_real {
            continue;
        }
        if let Some(found) = find_in_dir(&dir, tool) {
            return Ok(found);
        }
    }

    Err(ResolveError::NotFound {
        tool: tool.to_string(),
    })
}

/// Every match for `tool` along the search list, in order, shim directory
/// included. Used by `shim doctor` to reason about precedence.
pub fn all_matches_in(tool: &str, search: &OsString) -> Vec<PathBuf> {
    std::env::split_paths(search)
        .filter(|dir| !dir.as_os_str().is_empty())
        .filter_map(|dir| find_in_dir(&paths::clean(&dir), tool))
        .collect()
}

#[cfg(unix)]
fn find_in_dir(dir: &Path, tool: &str) -> Option<PathBuf> {
    let candidate = dir.join(tool);
    is_executable(&candidate).then_some(candidate)
}

#[cfg(windows)]
fn find_in_dir(dir: &Path, tool: &str) -> Option<PathBuf> {
    let candidate = dir.join(tool);
    if is_executable(&candidate) && has_executable_extension(&candidate) {
        return Some(candidate);
    }
    for ext in path_extensions() {
        let candidate = dir.join(format!("{}{}", tool, ext));
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(windows)]
fn path_extensions() -> Vec<String> {
    std::env::var("PATHEXT")
        .unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string())
        .split(';')
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
        .collect()
}

#[cfg(windows)]
fn has_executable_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = format!(".{}", ext.to_ascii_lowercase());
    path_extensions().iter().any(|e| *e == ext)
}

/// A regular file (after following symlinks) with at least one execute bit.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => !meta.is_dir() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Any existing non-directory entry.
#[cfg(windows)]
pub fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| !m.is_dir()).unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_exe(dir: &Path, name: &str, mode: u32) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn join<P: AsRef<Path>>(dirs: &[P]) -> OsString {
        std::env::join_paths(dirs.iter().map(|d| d.as_ref())).unwrap()
    }

    #[test]
    fn test_skips_shim_dir() {
        let tmp = TempDir::new().unwrap();
        let shims = tmp.path().join("shims");
        let real = tmp.path().join("bin");
        write_exe(&shims, "git", 0o755);
        let expected = write_exe(&real, "git", 0o755);

        let found = resolve_in("git", &join(&[&shims, &real]), &shims).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_skips_shim_dir_written_unclean() {
        let tmp = TempDir::new().unwrap();
        let shims = tmp.path().join("shims");
        let real = tmp.path().join("bin");
        write_exe(&shims, "go", 0o755);
        let expected = write_exe(&real, "go", 0o755);
        let unclean = PathBuf::from(format!("{}/./", shims.display()));

        let found = resolve_in("go", &join(&[&unclean, &real]), &shims).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_empty_entries_and_linked_shim_dir_skipped() {
        let tmp = TempDir::new().unwrap();
        let shims = tmp.path().join("shims");
        let real = tmp.path().join("bin");
        write_exe(&shims, "gh", 0o755);
        let expected = write_exe(&real, "gh", 0o755);
        let linked = tmp.path().join("linked");
        std::os::unix::fs::symlink(&shims, &linked).unwrap();

        let search = OsString::from(format!("::{}:{}", linked.display(), real.display()));
        assert_eq!(resolve_in("gh", &search, &shims).unwrap(), expected);
    }

    #[test]
    fn test_requires_execute_bit() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        write_exe(&a, "tool", 0o644);
        let expected = write_exe(&b, "tool", 0o700);

        let found = resolve_in("tool", &join(&[&a, &b]), Path::new("/nonexistent")).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_directories_are_not_executables() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("bin").join("tool")).unwrap();

        let err = resolve_in("tool", &join(&[&tmp.path().join("bin")]), Path::new("/x")).unwrap_err();
        assert_eq!(err, ResolveError::NotFound { tool: "tool".to_string() });
        assert!(err.to_string().contains("not found in search path"));
    }

    #[test]
    fn test_rejects_names_with_separators() {
        let err = resolve_in("../git", &OsString::from("/usr/bin"), Path::new("/x")).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidName { .. }));
    }

    #[test]
    fn test_all_matches_in_order() {
        let tmp = TempDir::new().unwrap();
        let first = write_exe(&tmp.path().join("1"), "x", 0o755);
        let second = write_exe(&tmp.path().join("2"), "x", 0o755);
        let search = join(&[&tmp.path().join("1"), &tmp.path().join("empty"), &tmp.path().join("2")]);
        assert_eq!(all_matches_in("x", &search), vec![first, second]);
    }
}
