//! Content-addressed tool identity
//!
//! Hashing a large binary on every shim call would be noticeable, so the
//! SHA-256 is memoized per path and reused while (size, mtime) are
//! unchanged. The version string is probed once per distinct hash.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{DbError, Store, ToolIdentity};

/// Per-probe deadline
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(800);

const PROBE_ARGS: &[&str] = &["--version", "version", "-V", "-v"];

static IDENTIFY_LOCK: Mutex<()> = Mutex::new(());

lazy_static! {
    // `2.43.0`, `v1.2.3-rc1`, or a dotted version behind a short name
    // (`go1.22.1`, `jq-1.7.1`).
    static ref VERSIONISH: Option<Regex> =
        Regex::new(r"^(?:[vV]?\d+(?:\.\d+)*|[A-Za-z]{1,8}[-_]?[vV]?\d+(?:\.\d+)+)[\w.+-]*$").ok();
}

#[derive(Debug)]
pub enum IdentifyError {
    Io(std::io::Error),
    Store(DbError),
}

impl std::fmt::Display for IdentifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifyError::Io(e) => write!(f, "IO error: {}", e),
            IdentifyError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for IdentifyError {}

impl From<std::io::Error> for IdentifyError {
    fn from(e: std::io::Error) -> Self {
        IdentifyError::Io(e)
    }
}

impl From<DbError> for IdentifyError {
    fn from(e: DbError) -> Self {
        IdentifyError::Store(e)
    }
}

pub type Result<T> = std::result::Result<T, IdentifyError>;

/// Identify `exe`, hashing it only when the path cache is stale.
pub fn identify(store: &Store, exe: &Path) -> Result<ToolIdentity> {
    let _guard = IDENTIFY_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let meta = std::fs::metadata(exe)?;
    let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
    let mtime_ns = mtime_nanos(&meta);
    let path = exe.to_string_lossy().to_string();

    let sha256 = match store.get_path_cache(&path)? {
        Some(entry) if entry.size == size && entry.mtime_ns == mtime_ns => entry.sha256,
        _ => {
            let digest = hash_file(exe)?;
            store.upsert_path_cache(&path, size, mtime_ns, &digest)?;
            digest
        }
    };

    if let Some(existing) = store.identity_by_sha(&sha256)? {
        return Ok(existing);
    }

    let version = probe_version(exe);
    Ok(store.insert_identity(&path, &sha256, &version)?)
}

/// Lowercase hex SHA-256 of a file's contents, streamed.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn mtime_nanos(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_nanos()).ok())
        .unwrap_or(0)
}

/// "<basename> <version>" or "<basename> (version unknown)".
pub fn probe_version(exe: &Path) -> String {
    let base = exe
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| exe.display().to_string());

    for arg in PROBE_ARGS {
        if let Some(output) = run_probe(exe, arg, PROBE_TIMEOUT) {
            if let Some(version) = versionish_line(&output) {
                return format!("{} {}", base, version);
            }
        }
    }
    format!("{} (version unknown)", base)
}

/// First non-empty line carrying a version-looking token.
pub fn versionish_line(output: &str) -> Option<String> {
    let re = VERSIONISH.as_ref()?;
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| {
            line.split_whitespace()
                .map(|w| w.trim_matches(|c| matches!(c, ',' | ';' | '(' | ')')))
                .any(|w| re.is_match(w))
        })
        .map(str::to_string)
}

/// Run `exe arg` with stdin closed, killing it at the deadline.
fn run_probe(exe: &Path, arg: &str, timeout: Duration) -> Option<String> {
    let mut child = Command::new(exe)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    let stdout = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });
    let stderr = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            buf
        })
    });

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::debug!(exe = %exe.display(), arg, "version probe timed out");
                return None;
            }
        }
    }

    let mut text = String::new();
    for pump in [stdout, stderr].into_iter().flatten() {
        if let Ok(bytes) = pump.join() {
            text.push_str(&String::from_utf8_lossy(&bytes));
        }
    }
    Some(text)
}
