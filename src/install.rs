//! Shim entries on disk
//!
//! Each shim is a filesystem reference named after a tool that points back
//! at this binary: a symlink where possible, else a hardlink, else a copy.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::paths::{self, BIN_NAME};
use crate::resolve;

#[derive(Debug)]
pub enum InstallError {
    InvalidName(String),
    CurrentExe(std::io::Error),
    Io { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallError::InvalidName(name) => write!(f, "invalid tool name: {:?}", name),
            InstallError::CurrentExe(e) => write!(f, "cannot locate the running executable: {}", e),
            InstallError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for InstallError {}

pub type Result<T> = std::result::Result<T, InstallError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> InstallError + '_ {
    move |source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// How a shim entry refers to the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Symlink,
    Hardlink,
    Copy,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkKind::Symlink => "symlink",
            LinkKind::Hardlink => "hardlink",
            LinkKind::Copy => "copy",
        };
        write!(f, "{}", s)
    }
}

/// One `shim doctor` finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warn,
    Inactive,
    Missing,
    Broken,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Warn => "warn",
            Status::Inactive => "inactive",
            Status::Missing => "missing",
            Status::Broken => "broken",
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Status::Inactive | Status::Missing | Status::Broken)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub status: Status,
    pub subject: String,
    pub detail: String,
}

impl Finding {
    fn new(status: Status, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}: {}", self.status.label(), self.subject)
        } else {
            write!(f, "{}: {} ({})", self.status.label(), self.subject, self.detail)
        }
    }
}

/// Manages `<data-dir>/shims`
pub struct InstallMgr {
    shim_dir: PathBuf,
    target: PathBuf,
}

impl InstallMgr {
    /// Shim directory under the data dir, pointing at the running binary.
    pub fn new() -> Result<Self> {
        let exe = std::env::current_exe().map_err(InstallError::CurrentExe)?;
        let target = std::fs::canonicalize(&exe).unwrap_or(exe);
        Ok(Self::with_paths(paths::shim_dir(), target))
    }

    pub fn with_paths(shim_dir: PathBuf, target: PathBuf) -> Self {
        Self { shim_dir, target }
    }

    pub fn shim_dir(&self) -> &Path {
        &self.shim_dir
    }

    /// Create or atomically replace a shim for each name.
    pub fn install(&self, names: &[String]) -> Result<Vec<(String, LinkKind)>> {
        for name in names {
            validate_name(name)?;
        }
        std::fs::create_dir_all(&self.shim_dir).map_err(io_err(&self.shim_dir))?;

        names
            .iter()
            .map(|name| self.install_one(name).map(|kind| (name.clone(), kind)))
            .collect()
    }

    fn install_one(&self, name: &str) -> Result<LinkKind> {
        let dest = self.shim_dir.join(name);
        let tmp = self.shim_dir.join(format!(".{}.tmp-{}", name, std::process::id()));
        let _ = std::fs::remove_file(&tmp);

        let kind = self.place(&tmp)?;
        if let Err(e) = std::fs::rename(&tmp, &dest) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&dest)(e));
        }
        tracing::debug!(name, kind = %kind, "installed shim");
        Ok(kind)
    }

    fn place(&self, at: &Path) -> Result<LinkKind> {
        #[cfg(unix)]
        {
            match std::os::unix::fs::symlink(&self.target, at) {
                Ok(()) => return Ok(LinkKind::Symlink),
                Err(e) => tracing::debug!(error = %e, "symlink failed, trying hardlink"),
            }
        }
        match std::fs::hard_link(&self.target, at) {
            Ok(()) => return Ok(LinkKind::Hardlink),
            Err(e) => tracing::debug!(error = %e, "hardlink failed, copying"),
        }
        std::fs::copy(&self.target, at).map_err(io_err(at))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(at, std::fs::Permissions::from_mode(0o755)).map_err(io_err(at))?;
        }
        Ok(LinkKind::Copy)
    }

    /// Remove shims; absent entries are not an error. Returns which names
    /// actually existed.
    pub fn uninstall(&self, names: &[String]) -> Result<Vec<(String, bool)>> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            validate_name(name)?;
            let path = self.shim_dir.join(name);
            match std::fs::remove_file(&path) {
                Ok(()) => out.push((name.clone(), true)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => out.push((name.clone(), false)),
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
        Ok(out)
    }

    /// Installed shim names, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.shim_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.shim_dir)(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&self.shim_dir))?;
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !(file_type.is_file() || file_type.is_symlink()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || name == BIN_NAME {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Check every shim against `search` (the executable search list).
    pub fn doctor(&self, search: &OsString) -> Result<Vec<Finding>> {
        let names = self.list()?;
        let mut findings = Vec::new();
        let shim_dir = paths::clean(&self.shim_dir);
        let shim_real = std::fs::canonicalize(&self.shim_dir).ok();

        let is_shim_dir = |dir: &Path| {
            let dir = paths::clean(dir);
            dir == shim_dir || (shim_real.is_some() && std::fs::canonicalize(&dir).ok() == shim_real)
        };

        let entries: Vec<PathBuf> = std::env::split_paths(search).filter(|d| !d.as_os_str().is_empty()).collect();
        let shown = paths::tilde(&self.shim_dir);
        match entries.iter().position(|d| is_shim_dir(d)) {
            None => findings.push(Finding::new(Status::Missing, shown, "not on PATH")),
            Some(0) => findings.push(Finding::new(Status::Ok, shown, "first on PATH")),
            Some(i) => findings.push(Finding::new(Status::Warn, shown, format!("PATH entry {} of {}", i + 1, entries.len()))),
        }

        if names.is_empty() {
            findings.push(Finding::new(Status::Warn, "no shims installed", ""));
            return Ok(findings);
        }

        for name in names {
            let shim = self.shim_dir.join(&name);
            if !resolve::is_executable(&shim) {
                let detail = match std::fs::read_link(&shim) {
                    Ok(target) => format!("target {} missing or not executable", target.display()),
                    Err(_) => "not executable".to_string(),
                };
                findings.push(Finding::new(Status::Broken, name, detail));
                continue;
            }

            let real = match resolve::resolve_in(&name, search, &self.shim_dir) {
                Ok(real) => real,
                Err(_) => {
                    findings.push(Finding::new(Status::Missing, name, "no real executable on PATH"));
                    continue;
                }
            };

            let first = resolve::all_matches_in(&name, search).into_iter().next();
            let shadowed = first
                .as_ref()
                .and_then(|p| p.parent())
                .is_some_and(|dir| !is_shim_dir(dir));
            if shadowed {
                let detail = match &first {
                    Some(p) => format!("{} comes first on PATH", paths::tilde(p)),
                    None => String::new(),
                };
                findings.push(Finding::new(Status::Inactive, name, detail));
            } else {
                findings.push(Finding::new(Status::Ok, name, format!("-> {}", paths::tilde(&real))));
            }
        }
        Ok(findings)
    }
}

/// A tool name usable as a file name in the shim directory.
pub fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name == BIN_NAME;
    if bad {
        return Err(InstallError::InvalidName(name.to_string()));
    }
    Ok(())
}
