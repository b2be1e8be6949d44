//! Run the real tool
//!
//! Interactive callers get a pseudo-terminal so colours, prompts and line
//! editing behave exactly as without the shim. Everyone else gets pipes,
//! teed through to our own stdout and stderr.

mod pipes;
mod pty;
mod tail;

pub use tail::TailBuffer;

use std::ffi::OsString;
use std::path::Path;

use crate::config;

/// Bytes kept per captured stream
pub const TAIL_CAPACITY: usize = 64 * 1024;

/// How the child was attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Pty,
    Pipes,
}

impl Mode {
    /// Tag stored with each invocation
    pub fn tag(self) -> &'static str {
        match self {
            Mode::Pty => "pty",
            Mode::Pipes => "pipes",
        }
    }
}

/// Outcome of one run. In PTY mode only `combined_tail` is filled.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub mode: Mode,
    pub stdout_tail: Vec<u8>,
    pub stderr_tail: Vec<u8>,
    pub combined_tail: Vec<u8>,
}

/// Error type for execution
#[derive(Debug)]
pub enum ExecError {
    /// The child could not be started at all
    Launch { program: String, message: String },
    /// The pseudo-terminal could not be set up; no child was started
    Pty(String),
    Io(std::io::Error),
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Launch { program, message } => write!(f, "failed to run {}: {}", program, message),
            ExecError::Pty(msg) => write!(f, "pty error: {}", msg),
            ExecError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ExecError {}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// Run `exe` with `args`, choosing PTY or pipes from the caller's stdio.
/// Arguments reach the child byte for byte.
pub fn run(exe: &Path, args: &[OsString]) -> Result<ExecResult> {
    if should_use_pty() {
        match pty::run(exe, args) {
            Err(ExecError::Pty(msg)) => {
                tracing::debug!(error = %msg, "pty unavailable, falling back to pipes");
            }
            other => return other,
        }
    }
    pipes::run(exe, args)
}

/// PTY mode when stdin and stdout are both terminals, or when forced.
pub fn should_use_pty() -> bool {
    if config::env_flag(config::FORCE_TTY_ENV) {
        return true;
    }
    stdio_is_terminal()
}

fn stdio_is_terminal() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal() && terminal_attrs_readable()
}

#[cfg(unix)]
fn terminal_attrs_readable() -> bool {
    // SAFETY: termios is plain data; tcgetattr only writes into it.
    unsafe {
        let mut attrs: libc::termios = std::mem::zeroed();
        libc::tcgetattr(libc::STDIN_FILENO, &mut attrs) == 0
    }
}

#[cfg(not(unix))]
fn terminal_attrs_readable() -> bool {
    true
}

/// Shell convention: exit code, else 128 + signal, else 1.
pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_tags() {
        assert_eq!(Mode::Pty.tag(), "pty");
        assert_eq!(Mode::Pipes.tag(), "pipes");
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_of_signal() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code_of(std::process::ExitStatus::from_raw(9)), 128 + 9);
        assert_eq!(exit_code_of(std::process::ExitStatus::from_raw(3 << 8)), 3);
    }
}
