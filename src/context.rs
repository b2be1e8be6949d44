//! Project identity for an invocation
//!
//! `git:<root>` when the working directory sits inside a worktree (the root
//! holds a `.git` directory, or a `.git` file for worktrees and submodules),
//! else `cwd:<dir>`.

use std::path::{Path, PathBuf};

pub const GIT_PREFIX: &str = "git:";
pub const CWD_PREFIX: &str = "cwd:";

/// Context key for the current working directory. Never fails; an
/// unreadable cwd is treated as `.`.
pub fn detect() -> String {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    detect_from(&cwd)
}

/// Context key for an explicit starting directory.
pub fn detect_from(start: &Path) -> String {
    match find_vcs_root(start) {
        Some(root) => format!("{}{}", GIT_PREFIX, root.display()),
        None => format!("{}{}", CWD_PREFIX, start.display()),
    }
}

/// Walk up directory tree to find `.git` (directory or file)
pub fn find_vcs_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        // `metadata` stats through symlinks exactly once, like the platform does.
        if std::fs::metadata(dir.join(".git")).is_ok() {
            return Some(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return None,
        }
    }
}

/// The repository root for a `git:` key.
pub fn git_root(key: &str) -> Option<&Path> {
    key.strip_prefix(GIT_PREFIX).map(Path::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_git_directory_marker() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir(root.join(".git")).unwrap();

        assert_eq!(detect_from(&nested), format!("git:{}", root.display()));
        assert_eq!(detect_from(&root), format!("git:{}", root.display()));
    }

    #[test]
    fn test_git_file_marker_for_worktrees() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("wt");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join(".git"), "gitdir: /elsewhere/.git/worktrees/wt\n").unwrap();

        assert_eq!(detect_from(&root.join("src")), format!("git:{}", root.display()));
    }

    #[test]
    fn test_innermost_root_wins() {
        let tmp = TempDir::new().unwrap();
        let outer = tmp.path().join("outer");
        let inner = outer.join("vendor").join("inner");
        std::fs::create_dir_all(inner.join(".git")).unwrap();
        std::fs::create_dir_all(outer.join(".git")).unwrap();

        assert_eq!(detect_from(&inner), format!("git:{}", inner.display()));
    }

    #[test]
    fn test_git_root_parses_key() {
        assert_eq!(git_root("git:/repo"), Some(Path::new("/repo")));
        assert_eq!(git_root("cwd:/tmp"), None);
    }
}
