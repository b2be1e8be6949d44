//! Diagnostic logging
//!
//! Always stderr, never stdout: in shim mode stdout belongs to the wrapped
//! tool. Shims stay silent unless `ACKCHYUALLY_LOG` asks otherwise.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "ACKCHYUALLY_LOG";

/// Which face of the binary is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Shim,
    Management,
}

impl Mode {
    fn default_directive(self) -> &'static str {
        match self {
            Mode::Shim => "off",
            Mode::Management => "warn",
        }
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(mode: Mode) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(mode.default_directive()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
