//! ackchyually - transparent command shims that remember what worked
//!
//! One binary, two faces. Invoked as `ackchyually` it is a management CLI.
//! Invoked through a shim named after a tool (`git`, `go`, `gh`, ...) it
//! finds the real tool, runs it untouched, and logs the invocation. When the
//! run looks like a usage mistake it prints a command that previously
//! succeeded in the same project:
//!
//! ```text
//! $ git stauts
//! git: 'stauts' is not a git command. See 'git --help'.
//! ackchyually: this worked before here:
//!   git status
//! ```
//!
//! # Pipeline
//!
//! | Step | Module |
//! |------|--------|
//! | project identity | [`context`] |
//! | find the real tool | [`resolve`] |
//! | content-address it | [`identity`] |
//! | run it (PTY or pipes) | [`exec`] |
//! | scrub and log | [`redact`], [`db`] |
//! | judge the outcome | [`usage`] |
//! | pick a suggestion | [`score`] |
//!
//! [`shim`] strings these together; [`install`] manages the shim entries.
//!
//! ```no_run
//! use ackchyually::{context, Store};
//!
//! let store = Store::open().unwrap();
//! let ctx = context::detect();
//! for argv in store.list_successful("git", &ctx, 5).unwrap() {
//!     println!("{}", ackchyually::shim::shell_join(&argv));
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod enable;
pub mod exec;
pub mod export;
pub mod identity;
pub mod install;
pub mod logging;
pub mod paths;
pub mod redact;
pub mod resolve;
pub mod schema;
pub mod score;
pub mod shim;
pub mod usage;
pub mod version;

pub use config::Config;
pub use db::{DbError, Invocation, LoggedInvocation, Store, Tag, ToolIdentity};
pub use exec::{ExecError, ExecResult, Mode};
pub use install::{InstallMgr, LinkKind};
pub use redact::Redactor;
pub use score::Candidate;
