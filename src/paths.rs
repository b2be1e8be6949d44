//! Well-known filesystem locations
//!
//! Everything ackchyually persists lives under one data directory:
//!
//! ```text
//! <data-dir>/ackchyually.sqlite   invocation log, tool identities, tags
//! <data-dir>/config.toml          optional settings
//! <data-dir>/shims/<tool>         one shim entry per installed tool
//! ```

use std::path::{Component, Path, PathBuf};

/// Canonical name of the management binary
pub const BIN_NAME: &str = "ackchyually";

/// Overrides the data directory (tests, sandboxes)
pub const DATA_DIR_ENV: &str = "ACKCHYUALLY_DATA_DIR";

pub const DB_FILE: &str = "ackchyually.sqlite";
pub const CONFIG_FILE: &str = "config.toml";
pub const SHIM_DIR: &str = "shims";

/// Root data directory.
///
/// `ACKCHYUALLY_DATA_DIR` wins; otherwise `$HOME/.local/share/ackchyually`
/// (or the platform's local data dir on Windows). Falls back to a relative
/// `.ackchyually` when no home can be found.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    #[cfg(windows)]
    {
        if let Some(dir) = dirs::data_local_dir() {
            return dir.join(BIN_NAME);
        }
    }

    match dirs::home_dir() {
        Some(home) => home.join(".local").join("share").join(BIN_NAME),
        None => PathBuf::from(format!(".{}", BIN_NAME)),
    }
}

pub fn db_path() -> PathBuf {
    data_dir().join(DB_FILE)
}

pub fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE)
}

pub fn shim_dir() -> PathBuf {
    data_dir().join(SHIM_DIR)
}

/// Lexically clean a path: drop `.` components, fold `..` against preceding
/// normal components, and strip trailing separators. Does not touch the
/// filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Display `path` relative to `$HOME` as `~/...` when it lives there.
pub fn tilde(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            if rest.as_os_str().is_empty() {
                return "~".to_string();
            }
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_removes_dots_and_trailing_slash() {
        assert_eq!(clean(Path::new("/a/./b/")), PathBuf::from("/a/b"));
        assert_eq!(clean(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(clean(Path::new("")), PathBuf::from("."));
        assert_eq!(clean(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_layout_under_data_dir() {
        let base = data_dir();
        assert_eq!(db_path(), base.join("ackchyually.sqlite"));
        assert_eq!(shim_dir(), base.join("shims"));
        assert_eq!(config_path(), base.join("config.toml"));
    }
}
