//! Credential scrubbing for argv and captured output
//!
//! Two independent mechanisms:
//!
//! 1. Sensitive flag names (`--token`, `--password`, ...). The value that
//!    follows the flag, either as the next element or after `=`, becomes
//!    `<redacted>`.
//! 2. Case-insensitive regexes for credential-shaped substrings (GitHub
//!    tokens, AWS keys, JWTs, ...). Each match is replaced in place.
//!
//! Environment-style `KEY=VALUE` arguments whose key names a secret are
//! treated like sensitive flags. All rules are idempotent: the marker
//! itself never matches a pattern.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::config::RedactConfig;

/// Replacement for every scrubbed value
pub const MARKER: &str = "<redacted>";

const MAX_PASSES: usize = 16;

const SENSITIVE_FLAGS: &[&str] = &["--token", "--password", "--pass", "--apikey", "--api-key"];

const SECRET_PATTERNS: &[&str] = &[
    // GitHub personal-access / OAuth / app tokens
    r"\bgh[pousr]_[A-Za-z0-9]{20,}\b",
    r"\bgithub_pat_[A-Za-z0-9_]{20,}\b",
    // AWS access key ids
    r"\b(?:AKIA|ASIA)[A-Z0-9]{16}\b",
    // Slack tokens
    r"\bxox[abposr]-[A-Za-z0-9-]{10,}",
    // JWTs
    r"\beyJ[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}",
    // OpenAI-style keys
    r"\bsk-(?:proj-|ant-)?[A-Za-z0-9_-]{20,}",
    // Google API keys
    r"\bAIza[0-9A-Za-z_-]{35}",
    // Basic-auth userinfo in URLs: keep scheme and host
    r"(?P<scheme>[a-z][a-z0-9+.-]*://)[^/\s:@<>]+:[^/\s@<>]+@",
    // Authorization headers
    r"(?P<auth>authorization:\s*(?:bearer|token|basic)\s+)[^\s<>'\x22]+",
];

const SECRET_ENV_KEY_HINTS: &[&str] = &[
    "TOKEN",
    "SECRET",
    "PASSWORD",
    "PASSWD",
    "API_KEY",
    "APIKEY",
    "PRIVATE_KEY",
    "CREDENTIAL",
];

lazy_static! {
    static ref BUILTIN_PATTERNS: Vec<Regex> = SECRET_PATTERNS
        .iter()
        .filter_map(|p| compile(p))
        .collect();
    static ref ENV_ASSIGNMENT: Option<Regex> = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$").ok();
}

fn compile(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern).case_insensitive(true).build().ok()
}

/// Replace a pattern's matches, keeping a `scheme`/`auth` prefix group when present.
fn replace_match(re: &Regex, text: &str) -> String {
    re.replace_all(text, |caps: &regex::Captures| {
        let keep = caps
            .name("scheme")
            .or_else(|| caps.name("auth"))
            .map(|m| m.as_str())
            .unwrap_or("");
        if keep.is_empty() {
            MARKER.to_string()
        } else if caps.name("scheme").is_some() {
            // userinfo collapses to a single marker before the host
            format!("{}{}@", keep, MARKER)
        } else {
            format!("{}{}", keep, MARKER)
        }
    })
    .into_owned()
}

/// Active redaction rule set
#[derive(Debug, Clone)]
pub struct Redactor {
    flags: Vec<String>,
    extra: Vec<Regex>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Redactor {
    /// Built-in rules only
    pub fn new() -> Self {
        Self {
            flags: SENSITIVE_FLAGS.iter().map(|s| s.to_string()).collect(),
            extra: Vec::new(),
        }
    }

    /// Built-in rules plus whatever `config.toml` adds
    pub fn from_config(config: &RedactConfig) -> Self {
        let mut redactor = Self::new();
        for flag in &config.extra_flags {
            let flag = flag.trim().to_ascii_lowercase();
            if flag.starts_with('-') && !redactor.flags.contains(&flag) {
                redactor.flags.push(flag);
            }
        }
        for pattern in &config.extra_patterns {
            match compile(pattern) {
                // A rule that matches the marker would break idempotence.
                Some(re) if re.is_match(MARKER) => {
                    tracing::warn!(pattern = %pattern, "ignoring redaction pattern that matches the marker");
                }
                Some(re) => redactor.extra.push(re),
                None => {
                    tracing::warn!(pattern = %pattern, "ignoring invalid redaction pattern");
                }
            }
        }
        redactor
    }

    fn is_sensitive_flag(&self, arg: &str) -> bool {
        let lower = arg.to_ascii_lowercase();
        self.flags.iter().any(|f| *f == lower)
    }

    /// Scrub free text (captured output, single arguments).
    pub fn redact_text(&self, text: &str) -> String {
        let mut out = text.to_string();
        // A replacement can expose a fresh match next to the marker, so run
        // to a fixpoint.
        for _ in 0..MAX_PASSES {
            let mut changed = false;
            for re in BUILTIN_PATTERNS.iter().chain(self.extra.iter()) {
                if re.is_match(&out) {
                    let next = replace_match(re, &out);
                    if next != out {
                        changed = true;
                        out = next;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        out
    }

    /// Scrub raw bytes, returning lossy UTF-8 text.
    pub fn redact_bytes(&self, bytes: &[u8]) -> String {
        self.redact_text(&String::from_utf8_lossy(bytes))
    }

    /// Scrub an argv list in order.
    pub fn redact_argv(&self, argv: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(argv.len());
        let mut redact_next = false;

        for arg in argv {
            if redact_next {
                out.push(MARKER.to_string());
                redact_next = false;
                continue;
            }

            if self.is_sensitive_flag(arg) {
                out.push(arg.clone());
                redact_next = true;
                continue;
            }

            if let Some((flag, _value)) = arg.split_once('=') {
                if self.is_sensitive_flag(flag) {
                    out.push(format!("{}={}", flag, MARKER));
                    continue;
                }
                if let Some(redacted) = redact_env_assignment(arg) {
                    out.push(redacted);
                    continue;
                }
            }

            out.push(self.redact_text(arg));
        }
        out
    }
}

/// `GITHUB_TOKEN=abc` -> `GITHUB_TOKEN=<redacted>`; `None` when the key is benign.
pub fn redact_env_assignment(arg: &str) -> Option<String> {
    let caps = ENV_ASSIGNMENT.as_ref()?.captures(arg)?;
    let key = caps.get(1)?.as_str();
    let value = caps.get(2)?.as_str();
    let upper = key.to_ascii_uppercase();
    let sensitive = SECRET_ENV_KEY_HINTS.iter().any(|hint| upper.contains(hint));
    if !sensitive || value.is_empty() || value == MARKER {
        return if sensitive { Some(arg.to_string()) } else { None };
    }
    Some(format!("{}={}", key, MARKER))
}

/// True when any element carries the marker (such a command cannot be replayed).
pub fn contains_marker(argv: &[String]) -> bool {
    argv.iter().any(|a| a.contains(MARKER))
}
