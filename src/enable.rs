//! `shim enable`: put the shim directory on PATH via the shell rc file
//!
//! Writes one marked block. Running it again rewrites the block in place
//! instead of appending a second one.

use std::path::{Path, PathBuf};

const BEGIN: &str = "# >>> ackchyually >>>";
const END: &str = "# <<< ackchyually <<<";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Shell {
    Zsh,
    Bash,
    Fish,
}

impl Shell {
    /// Guess from `$SHELL`, defaulting to bash.
    pub fn detect() -> Self {
        let shell = std::env::var("SHELL").unwrap_or_default();
        match Path::new(&shell).file_name().and_then(|n| n.to_str()) {
            Some("zsh") => Shell::Zsh,
            Some("fish") => Shell::Fish,
            _ => Shell::Bash,
        }
    }

    pub fn default_rc(self, home: &Path) -> PathBuf {
        match self {
            Shell::Zsh => home.join(".zshrc"),
            Shell::Bash => home.join(".bashrc"),
            Shell::Fish => home.join(".config").join("fish").join("config.fish"),
        }
    }

    fn snippet(self, shim_dir: &Path) -> String {
        let dir = shim_dir.display().to_string().replace('"', "\\\"");
        match self {
            Shell::Zsh | Shell::Bash => format!("export PATH=\"{}:$PATH\"", dir),
            Shell::Fish => format!("fish_add_path --move --prepend \"{}\"", dir),
        }
    }
}

/// What `enable` did to the rc file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Added,
    Updated,
    Unchanged,
}

/// The marked block for `shell`.
pub fn block(shell: Shell, shim_dir: &Path) -> String {
    format!("{}\n{}\n{}\n", BEGIN, shell.snippet(shim_dir), END)
}

/// `existing` with the block inserted or replaced.
pub fn apply(existing: &str, block: &str) -> String {
    if let Some(start) = existing.find(BEGIN) {
        if let Some(end_rel) = existing[start..].find(END) {
            let mut end = start + end_rel + END.len();
            if existing[end..].starts_with('\n') {
                end += 1;
            }
            return format!("{}{}{}", &existing[..start], block, &existing[end..]);
        }
    }
    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(block);
    out
}

/// Write the block for `shell` into `rc`, creating the file if needed.
pub fn enable(shell: Shell, rc: &Path, shim_dir: &Path) -> std::io::Result<Outcome> {
    let existing = match std::fs::read_to_string(rc) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let updated = apply(&existing, &block(shell, shim_dir));
    if updated == existing {
        return Ok(Outcome::Unchanged);
    }
    if let Some(parent) = rc.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(rc, updated)?;
    Ok(if existing.contains(BEGIN) {
        Outcome::Updated
    } else {
        Outcome::Added
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_enable_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let rc = tmp.path().join(".zshrc");
        std::fs::write(&rc, "alias ll='ls -l'").unwrap();
        let dir = Path::new("/home/u/.local/share/ackchyually/shims");

        assert_eq!(enable(Shell::Zsh, &rc, dir).unwrap(), Outcome::Added);
        assert_eq!(enable(Shell::Zsh, &rc, dir).unwrap(), Outcome::Unchanged);

        let text = std::fs::read_to_string(&rc).unwrap();
        assert!(text.starts_with("alias ll='ls -l'\n\n# >>> ackchyually >>>\n"));
        assert_eq!(text.matches(BEGIN).count(), 1);
        assert!(text.contains("export PATH=\"/home/u/.local/share/ackchyually/shims:$PATH\""));
    }

    #[test]
    fn test_enable_updates_block_in_place() {
        let tmp = TempDir::new().unwrap();
        let rc = tmp.path().join(".bashrc");
        enable(Shell::Bash, &rc, Path::new("/old/shims")).unwrap();
        std::fs::write(&rc, format!("{}echo after\n", std::fs::read_to_string(&rc).unwrap())).unwrap();

        assert_eq!(enable(Shell::Bash, &rc, Path::new("/new/shims")).unwrap(), Outcome::Updated);
        let text = std::fs::read_to_string(&rc).unwrap();
        assert!(!text.contains("/old/shims"));
        assert!(text.ends_with("# <<< ackchyually <<<\necho after\n"));
    }

    #[test]
    fn test_fish_creates_config_dirs() {
        let tmp = TempDir::new().unwrap();
        let rc = Shell::Fish.default_rc(tmp.path());
        enable(Shell::Fish, &rc, Path::new("/s")).unwrap();
        assert!(std::fs::read_to_string(&rc).unwrap().contains("fish_add_path --move --prepend \"/s\""));
    }
}
