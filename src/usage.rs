//! Did the tool just tell the user they held it wrong?
//!
//! Reads intent (the argv itself) and consequence (exit code, a few anchor
//! phrases in the diagnostics). Never parses a tool's grammar.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::exec::{ExecResult, Mode};

/// BSD `EX_USAGE`
pub const EX_USAGE: i32 = 64;

const HELP_TOKENS: &[&str] = &["-h", "--help", "-help", "help"];

const USAGE_PHRASES: &[&str] = &[
    r"usage:",
    r"unknown option",
    r"unrecognized option",
    r"unknown flag",
    r"unexpected argument",
    r"missing required",
    r"is not an? (?:[\w.:-]+ )?command",
];

lazy_static! {
    static ref ANSI_ESCAPE: Option<Regex> =
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").ok();
    static ref DIAG_PREFIX: Option<Regex> = RegexBuilder::new(r"^\s*(?:error|fatal)\s*:\s*")
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .ok();
    static ref USAGE_PHRASE: Option<Regex> = RegexBuilder::new(&USAGE_PHRASES.join("|"))
        .case_insensitive(true)
        .build()
        .ok();
}

/// True when the argv tail asks for help explicitly.
pub fn requests_help(tail: &[String]) -> bool {
    tail.iter().any(|a| HELP_TOKENS.contains(&a.as_str()))
}

/// Drop escape sequences and leading `error:` / `fatal:` labels.
pub fn normalize(text: &str) -> String {
    let stripped = match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => text.into(),
    };
    match DIAG_PREFIX.as_ref() {
        Some(re) => re.replace_all(&stripped, "").into_owned(),
        None => stripped.into_owned(),
    }
}

/// Any anchor phrase present after normalization.
pub fn has_usage_phrase(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let text = normalize(text);
    USAGE_PHRASE.as_ref().is_some_and(|re| re.is_match(&text))
}

/// The verdict for one completed run.
///
/// In piped mode only stderr is inspected: well-behaved tools print
/// structured output on stdout that may contain the same words.
pub fn looks_like_usage(tail: &[String], exit_code: i32, result: &ExecResult) -> bool {
    if requests_help(tail) {
        return false;
    }
    if exit_code == EX_USAGE {
        return true;
    }
    let text = match result.mode {
        Mode::Pty => &result.combined_tail,
        Mode::Pipes => &result.stderr_tail,
    };
    has_usage_phrase(&String::from_utf8_lossy(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn piped(stdout: &str, stderr: &str) -> ExecResult {
        ExecResult {
            exit_code: 0,
            mode: Mode::Pipes,
            stdout_tail: stdout.as_bytes().to_vec(),
            stderr_tail: stderr.as_bytes().to_vec(),
            combined_tail: format!("{}{}", stdout, stderr).into_bytes(),
        }
    }

    fn pty(combined: &str) -> ExecResult {
        ExecResult {
            exit_code: 0,
            mode: Mode::Pty,
            stdout_tail: Vec::new(),
            stderr_tail: Vec::new(),
            combined_tail: combined.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_git_unknown_subcommand() {
        let r = piped("", "git: 'stauts' is not a git command. See 'git --help'.\n");
        assert!(looks_like_usage(&argv(&["stauts"]), 1, &r));
    }

    #[test]
    fn test_json_on_stdout_is_not_usage() {
        let r = piped("{\"notes\":\"Usage: not help\",\"items\":[]}\n", "");
        assert!(!looks_like_usage(&argv(&["list"]), 0, &r));
    }

    #[test]
    fn test_zero_exit_with_stderr_diagnostic() {
        let r = piped("", "curl: unknown option --bogus\n");
        assert!(looks_like_usage(&argv(&["-w", "%{bogus}"]), 0, &r));
    }

    #[test]
    fn test_exit_64_is_usage() {
        assert!(looks_like_usage(&argv(&["x"]), EX_USAGE, &piped("", "")));
    }

    #[test]
    fn test_pty_reads_combined_tail_with_ansi() {
        let r = pty("\x1b[31merror:\x1b[0m unexpected argument '--jsn' found\r\n");
        assert!(looks_like_usage(&argv(&["--jsn"]), 2, &r));
    }

    #[test]
    fn test_fatal_prefix_stripped() {
        assert!(has_usage_phrase("fatal: usage: git foo\n"));
        assert_eq!(normalize("error: thing\nfatal: other"), "thing\nother");
    }

    #[test]
    fn test_runtime_failure_is_not_usage() {
        let r = piped("", "error: could not connect to server\n");
        assert!(!looks_like_usage(&argv(&["push"]), 1, &r));
    }

    #[test]
    fn test_is_not_a_command_variants() {
        assert!(has_usage_phrase("'frob' is not a command"));
        assert!(has_usage_phrase("\"frob\" is not an npm command"));
        assert!(has_usage_phrase("frob is not a go.mod command"));
    }

    proptest! {
        #[test]
        fn prop_explicit_help_never_usage(
            code in any::<i32>(),
            out in ".{0,64}",
            help in proptest::sample::select(HELP_TOKENS),
            before in proptest::collection::vec("[a-z]{1,6}", 0..3),
        ) {
            let mut tail: Vec<String> = before;
            tail.push(help.to_string());
            let r = piped(&out, &format!("Usage: {}", out));
            prop_assert!(!looks_like_usage(&tail, code, &r));
            prop_assert!(!looks_like_usage(&tail, code, &pty(&out)));
        }
    }
}
