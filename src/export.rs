//! Export tags and known-good commands
//!
//! Produces Markdown or JSON meant to be pasted into a README, an agent's
//! instructions file, or a chat. Paths are made portable (`./` inside the
//! repository, `~/` inside the home directory) and secret-looking
//! `KEY=VALUE` arguments are scrubbed.

use serde::Serialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::context;
use crate::db::{self, Store};
use crate::redact::{self, Redactor};
use crate::shim::shell_join;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Md,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportTag {
    pub label: String,
    pub tool: String,
    pub command: String,
    pub argv: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportCommand {
    pub command: String,
    pub argv: Vec<String>,
    pub count: i64,
    pub last_seen: String,
}

/// Everything one export contains
#[derive(Debug, Clone, Serialize)]
pub struct ExportDoc {
    pub context: String,
    pub tags: Vec<ExportTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<ExportCommand>,
}

/// Rewrites paths and scrubs arguments for sharing.
pub struct Normalizer {
    repo_root: Option<PathBuf>,
    home: Option<PathBuf>,
    redactor: Redactor,
}

impl Normalizer {
    pub fn new(context_key: &str, home: Option<PathBuf>, redactor: Redactor) -> Self {
        Self {
            repo_root: context::git_root(context_key).map(Path::to_path_buf),
            home,
            redactor,
        }
    }

    fn path(&self, p: &str) -> String {
        let path = Path::new(p);
        if !path.is_absolute() {
            return p.to_string();
        }
        if let Some(root) = &self.repo_root {
            if let Ok(rest) = path.strip_prefix(root) {
                if rest.as_os_str().is_empty() {
                    return ".".to_string();
                }
                return format!("./{}", rest.display());
            }
        }
        if let Some(home) = &self.home {
            if let Ok(rest) = path.strip_prefix(home) {
                if rest.as_os_str().is_empty() {
                    return "~".to_string();
                }
                return format!("~/{}", rest.display());
            }
        }
        p.to_string()
    }

    /// One argument: env-style secrets first, then paths (bare or as the
    /// value of `--flag=`).
    pub fn arg(&self, arg: &str) -> String {
        if let Some(scrubbed) = redact::redact_env_assignment(arg) {
            return scrubbed;
        }
        if let Some((flag, value)) = arg.split_once('=') {
            if flag.starts_with('-') && value.starts_with('/') {
                return format!("{}={}", flag, self.path(value));
            }
        }
        self.path(arg)
    }

    pub fn argv(&self, argv: &[String]) -> Vec<String> {
        self.redactor
            .redact_argv(argv)
            .iter()
            .map(|a| self.arg(a))
            .collect()
    }

    pub fn context(&self, key: &str) -> String {
        for prefix in [context::GIT_PREFIX, context::CWD_PREFIX] {
            if let Some(rest) = key.strip_prefix(prefix) {
                let shown = match &self.home {
                    Some(home) => match Path::new(rest).strip_prefix(home) {
                        Ok(r) if r.as_os_str().is_empty() => "~".to_string(),
                        Ok(r) => format!("~/{}", r.display()),
                        Err(_) => rest.to_string(),
                    },
                    None => rest.to_string(),
                };
                return format!("{}{}", prefix, shown);
            }
        }
        key.to_string()
    }
}

/// Gather tags for `context_key` and, when a tool is named, up to `limit`
/// of its successful commands.
pub fn build(
    store: &Store,
    context_key: &str,
    tool: Option<&str>,
    limit: i64,
    normalizer: &Normalizer,
) -> db::Result<ExportDoc> {
    let tags = store
        .list_tags(context_key, tool)?
        .into_iter()
        .map(|t| {
            let argv = normalizer.argv(&t.argv);
            ExportTag {
                label: t.label,
                tool: t.tool,
                command: shell_join(&argv),
                argv,
            }
        })
        .collect();

    let commands = match tool {
        Some(tool) => store
            .list_success_candidates(tool, context_key, limit)?
            .into_iter()
            .map(|c| {
                let argv = normalizer.argv(&c.argv);
                ExportCommand {
                    command: shell_join(&argv),
                    argv,
                    count: c.count,
                    last_seen: db::format_ts(c.last_seen),
                }
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(ExportDoc {
        context: normalizer.context(context_key),
        tags,
        tool: tool.map(str::to_string),
        commands,
    })
}

pub fn render_json(doc: &ExportDoc) -> serde_json::Result<String> {
    serde_json::to_string_pretty(doc)
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}

pub fn render_markdown(doc: &ExportDoc) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Known-good commands\n");
    let _ = writeln!(out, "Context: `{}`\n", doc.context);

    let _ = writeln!(out, "## Tags\n");
    if doc.tags.is_empty() {
        let _ = writeln!(out, "_No tags._\n");
    } else {
        let _ = writeln!(out, "| Label | Command |");
        let _ = writeln!(out, "|-------|---------|");
        for tag in &doc.tags {
            let _ = writeln!(out, "| {} | `{}` |", escape_cell(&tag.label), escape_cell(&tag.command));
        }
        let _ = writeln!(out);
    }

    if let Some(tool) = &doc.tool {
        let _ = writeln!(out, "## Recent successful `{}` commands\n", tool);
        if doc.commands.is_empty() {
            let _ = writeln!(out, "_None recorded._");
        }
        for cmd in &doc.commands {
            let times = if cmd.count == 1 { "once".to_string() } else { format!("{} times", cmd.count) };
            let _ = writeln!(out, "- `{}` ({}, last {})", cmd.command, times, cmd.last_seen);
        }
    }
    out
}
