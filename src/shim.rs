//! Shim mode: one tool invocation, end to end
//!
//! Resolve the real tool, run it, log what happened, and when the run looks
//! like a usage mistake print a command that worked here before. Our own
//! output only ever goes to stderr, prefixed with `ackchyually:`.

use chrono::Utc;
use std::ffi::OsString;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::db::{Invocation, Store};
use crate::exec::{self, ExecResult};
use crate::redact::Redactor;
use crate::{context, identity, resolve, score, usage};

/// Exit code when the real tool cannot be found
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code when the real tool cannot be started
pub const EXIT_LAUNCH_FAILED: i32 = 1;

const PREFIX: &str = "ackchyually:";

/// Everything one shim process needs besides the argv.
struct Session {
    config: Config,
    redactor: Redactor,
    store: Option<Store>,
    context_key: String,
}

impl Session {
    fn open() -> Self {
        let config = Config::load();
        let redactor = Redactor::from_config(&config.redact);
        let store = match Store::open() {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!(error = %e, "invocation log unavailable");
                None
            }
        };
        Self {
            config,
            redactor,
            store,
            context_key: context::detect(),
        }
    }
}

/// Run `tool` with `args` as if the shim were not there. Returns the exit
/// code the shell should see.
pub fn run(tool: &str, args: &[OsString]) -> i32 {
    let exe = match resolve::resolve(tool) {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("{} {}", PREFIX, e);
            return EXIT_NOT_FOUND;
        }
    };

    let session = Session::open();
    let (code, suggestion) = invoke(&session, tool, &exe, args);

    let Some(argv) = suggestion else {
        return code;
    };
    eprintln!("{} this worked before here:", PREFIX);
    eprintln!("  {}", shell_join(&argv));

    if !session.config.suggest.auto_exec {
        return code;
    }
    eprintln!("{} running it", PREFIX);
    // The replay never suggests again.
    let replay: Vec<OsString> = argv.iter().skip(1).map(OsString::from).collect();
    let (replayed, _) = invoke(&session, tool, &exe, &replay);
    replayed
}

/// Run, log, and judge one invocation. Returns the child's exit code and,
/// when the run looked like a usage mistake, the command to suggest.
fn invoke(session: &Session, tool: &str, exe: &Path, args: &[OsString]) -> (i32, Option<Vec<String>>) {
    let tool_id = session.store.as_ref().and_then(|store| match identity::identify(store, exe) {
        Ok(identity) => Some(identity.id),
        Err(e) => {
            tracing::debug!(exe = %exe.display(), error = %e, "identify failed");
            None
        }
    });

    let started_at = Utc::now();
    let clock = Instant::now();
    let result = match exec::run(exe, args) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{} {}", PREFIX, e);
            return (EXIT_LAUNCH_FAILED, None);
        }
    };
    let duration_ms = i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX);

    // The child got the raw bytes; logging and matching work on text.
    let text_args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
    let mut safe_argv = session.redactor.redact_argv(&full_argv(tool, &text_args));
    safe_argv[0] = tool.to_string();

    let usage_like = usage::looks_like_usage(&text_args, result.exit_code, &result);

    if let Some(store) = &session.store {
        let inv = build_invocation(session, tool, exe, tool_id, &safe_argv, &result, usage_like, started_at, duration_ms);
        if let Err(e) = store.append_invocation(&inv) {
            tracing::debug!(error = %e, "append failed");
        }
    }

    if !usage_like {
        return (result.exit_code, None);
    }
    (result.exit_code, suggest(session, tool, &safe_argv))
}

fn full_argv(tool: &str, args: &[String]) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(tool.to_string());
    argv.extend(args.iter().cloned());
    argv
}

fn build_invocation(
    session: &Session,
    tool: &str,
    exe: &Path,
    tool_id: Option<i32>,
    safe_argv: &[String],
    result: &ExecResult,
    usage_like: bool,
    started_at: chrono::DateTime<Utc>,
    duration_ms: i64,
) -> Invocation {
    // A clean exit the heuristic still flagged is recorded as EX_USAGE.
    let exit_code = if usage_like && result.exit_code == 0 {
        usage::EX_USAGE
    } else {
        result.exit_code
    };
    Invocation {
        started_at,
        duration_ms,
        context_key: session.context_key.clone(),
        tool: tool.to_string(),
        exe_path: exe.display().to_string(),
        tool_id,
        argv: safe_argv.to_vec(),
        exit_code,
        mode: result.mode.tag().to_string(),
        stdout_tail: session.redactor.redact_bytes(&result.stdout_tail),
        stderr_tail: session.redactor.redact_bytes(&result.stderr_tail),
        combined_tail: session.redactor.redact_bytes(&result.combined_tail),
    }
}

fn suggest(session: &Session, tool: &str, safe_argv: &[String]) -> Option<Vec<String>> {
    let store = session.store.as_ref()?;
    let candidates = match store.list_success_candidates(tool, &session.context_key, session.config.suggest.candidate_limit) {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::debug!(error = %e, "candidate query failed");
            return None;
        }
    };
    score::pick(&candidates, safe_argv, Utc::now()).map(|c| c.argv.clone())
}

fn needs_quoting(token: &str) -> bool {
    token.is_empty()
        || token.chars().any(|c| {
            c.is_whitespace()
                || matches!(
                    c,
                    '\'' | '"' | '\\' | '$' | '`' | ';' | '&' | '|' | '<' | '>' | '(' | ')' | '*' | '?' | '[' | ']' | '{' | '}' | '!' | '#'
                )
        })
}

/// Quote one token for a POSIX shell; plain words pass through.
pub fn shell_quote(token: &str) -> String {
    if !needs_quoting(token) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', r"'\''"))
}

/// A whole argv as one copy-pasteable line.
pub fn shell_join(argv: &[String]) -> String {
    argv.iter().map(|t| shell_quote(t)).collect::<Vec<_>>().join(" ")
}
