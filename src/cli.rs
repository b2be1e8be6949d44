//! Management CLI
//!
//! What `ackchyually` does when invoked under its own name. Exit codes:
//! 0 success, 1 operational failure, 2 usage error.

use chrono::Utc;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::ffi::{OsStr, OsString};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db::Store;
use crate::enable::{self, Shell};
use crate::export::{self, Format, Normalizer};
use crate::install::{InstallMgr, Status};
use crate::paths::{self, BIN_NAME};
use crate::redact::{self, Redactor};
use crate::version::BuildInfo;
use crate::{context, score, shim};

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

type CliResult = Result<i32, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "ackchyually")]
#[command(author, version, about = "Transparent command shims that remember what worked", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install, remove and check tool shims
    Shim {
        #[command(subcommand)]
        action: ShimAction,
    },

    /// Print the best known-good commands for a tool in this project
    Best {
        /// Tool base name (e.g. git)
        #[arg(long)]
        tool: String,

        /// Words describing what you want to run
        query: Vec<String>,

        /// How many commands to print (default from config, 5)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Bookmark commands per project
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Export tags and known-good commands as Markdown or JSON
    Export {
        /// Output format
        #[arg(long, value_enum, default_value = "md")]
        format: Format,

        /// Also include recent successful commands for this tool
        #[arg(long)]
        tool: Option<String>,

        /// Maximum number of commands to include
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Show version, commit and build date
    Version {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ShimAction {
    /// Create shims for the named tools
    Install {
        #[arg(required = true)]
        tools: Vec<String>,
    },

    /// Remove shims (missing ones are ignored)
    Uninstall {
        #[arg(required = true)]
        tools: Vec<String>,
    },

    /// List installed shims
    List,

    /// Check shims and PATH ordering
    Doctor,

    /// Add the shim directory to PATH in your shell rc file
    Enable {
        /// Shell flavour (detected from $SHELL by default)
        #[arg(long, value_enum)]
        shell: Option<Shell>,

        /// Rc file to edit (default depends on the shell)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TagAction {
    /// Save a command under a label: tag add <label> -- <command...>
    Add {
        label: String,

        /// The command to save, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Run a saved command
    Run { label: String },

    /// List tags in this project
    List {
        /// Only tags for this tool
        #[arg(long)]
        tool: Option<String>,
    },
}

/// Subcommand names offered as corrections.
const SUBCOMMANDS: &[&str] = &["shim", "best", "tag", "export", "version", "completion", "help"];

/// Base name the binary was invoked as, without a Windows `.exe`.
pub fn invoked_name(argv0: &OsStr) -> String {
    let path = Path::new(argv0);
    let name = match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("exe") => path.file_stem(),
        _ => path.file_name(),
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| BIN_NAME.to_string())
}

pub fn is_management_name(name: &str) -> bool {
    name == BIN_NAME
}

/// Closest known subcommand: a prefix, or one edit or swap away.
pub fn suggest_subcommand(input: &str) -> Option<&'static str> {
    let lower = input.to_lowercase();
    if lower.is_empty() {
        return None;
    }
    SUBCOMMANDS
        .iter()
        .copied()
        .find(|known| known.starts_with(&lower) && lower.len() >= 2)
        .or_else(|| SUBCOMMANDS.iter().copied().find(|known| score::edit_distance(&lower, known) <= 1))
}

/// Parse `args` (argv[0] included) and run the management command.
pub fn run(args: Vec<OsString>) -> i32 {
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => return parse_failure(e, &args),
    };

    match dispatch(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ackchyually: {}", e);
            EXIT_FAILURE
        }
    }
}

fn parse_failure(e: clap::Error, args: &[OsString]) -> i32 {
    if e.kind() != ErrorKind::InvalidSubcommand {
        let _ = e.print();
        return e.exit_code();
    }

    let unknown = match e.get(ContextKind::InvalidSubcommand) {
        Some(ContextValue::String(s)) => s.clone(),
        _ => args
            .get(1)
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    eprintln!("ackchyually: unknown command \"{}\"", unknown);
    if let Some(known) = suggest_subcommand(&unknown) {
        eprintln!("ackchyually: did you mean \"{}\"?", known);
    }
    eprintln!("ackchyually: run 'ackchyually --help' for usage");
    EXIT_USAGE
}

fn dispatch(command: Command) -> CliResult {
    match command {
        Command::Shim { action } => shim_command(action),
        Command::Best { tool, query, limit } => best(&tool, &query, limit),
        Command::Tag { action } => tag_command(action),
        Command::Export { format, tool, limit } => export_command(format, tool.as_deref(), limit),
        Command::Version { json } => {
            let info = BuildInfo::current();
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{}", info);
            }
            Ok(0)
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut std::io::stdout());
            Ok(0)
        }
    }
}

// ============================================================================
// shim
// ============================================================================

fn shim_command(action: ShimAction) -> CliResult {
    let mgr = InstallMgr::new()?;
    match action {
        ShimAction::Install { tools } => {
            for (name, kind) in mgr.install(&tools)? {
                println!("{} {} ({})", "installed".green(), name, kind);
            }
            let search = std::env::var_os("PATH").unwrap_or_default();
            let on_path = std::env::split_paths(&search).any(|d| paths::clean(&d) == paths::clean(mgr.shim_dir()));
            if !on_path {
                eprintln!(
                    "ackchyually: {} is not on PATH yet; run 'ackchyually shim enable'",
                    paths::tilde(mgr.shim_dir())
                );
            }
            Ok(0)
        }
        ShimAction::Uninstall { tools } => {
            for (name, existed) in mgr.uninstall(&tools)? {
                if existed {
                    println!("{} {}", "removed".yellow(), name);
                } else {
                    println!("{} {} (not installed)", "skipped".dimmed(), name);
                }
            }
            Ok(0)
        }
        ShimAction::List => {
            for name in mgr.list()? {
                println!("{}", name);
            }
            Ok(0)
        }
        ShimAction::Doctor => {
            let search = std::env::var_os("PATH").unwrap_or_default();
            let findings = mgr.doctor(&search)?;
            let mut failed = false;
            for finding in &findings {
                let label = format!("{}:", finding.status.label());
                let label = match finding.status {
                    Status::Ok => label.green(),
                    Status::Warn => label.yellow(),
                    _ => label.red().bold(),
                };
                let rest = if finding.detail.is_empty() {
                    finding.subject.clone()
                } else {
                    format!("{} ({})", finding.subject, finding.detail)
                };
                println!("{} {}", label, rest);
                failed |= finding.status.is_failure();
            }
            Ok(if failed { EXIT_FAILURE } else { 0 })
        }
        ShimAction::Enable { shell, file } => {
            let shell = shell.unwrap_or_else(Shell::detect);
            let rc = match file {
                Some(file) => file,
                None => shell.default_rc(&dirs::home_dir().ok_or("cannot determine home directory")?),
            };
            match enable::enable(shell, &rc, mgr.shim_dir())? {
                enable::Outcome::Unchanged => println!("{} is already set up", paths::tilde(&rc)),
                enable::Outcome::Added | enable::Outcome::Updated => {
                    println!("{} {}", "updated".green(), paths::tilde(&rc));
                    println!("open a new shell (or source {}) to activate the shims", paths::tilde(&rc));
                }
            }
            Ok(0)
        }
    }
}

// ============================================================================
// best / tag / export
// ============================================================================

fn best(tool: &str, query: &[String], limit: Option<usize>) -> CliResult {
    let config = Config::load();
    let store = Store::open()?;
    let ctx = context::detect();
    let candidates = store.list_success_candidates(tool, &ctx, config.suggest.candidate_limit)?;
    let limit = limit.unwrap_or(config.suggest.best_limit);

    let ranked = score::best(&candidates, query, limit, Utc::now());
    if ranked.is_empty() {
        eprintln!("ackchyually: no successful {} commands recorded here", tool);
        return Ok(EXIT_FAILURE);
    }
    for candidate in ranked {
        println!("{}", shim::shell_join(&candidate.argv));
    }
    Ok(0)
}

fn tag_command(action: TagAction) -> CliResult {
    let store = Store::open()?;
    let ctx = context::detect();
    match action {
        TagAction::Add { label, command } => {
            let Some(program) = command.first() else {
                return Err("tag add needs a command after --".into());
            };
            let tool = invoked_name(OsStr::new(program));
            let mut argv = command.clone();
            argv[0] = tool.clone();

            let redactor = Redactor::from_config(&Config::load().redact);
            if redact::contains_marker(&redactor.redact_argv(&argv)) {
                return Err("refusing to save a command that carries credentials".into());
            }
            store.upsert_tag(&ctx, &label, &tool, &argv)?;
            println!("{} {} = {}", "tagged".green(), label, shim::shell_join(&argv));
            Ok(0)
        }
        TagAction::Run { label } => {
            let tag = store
                .get_tag(&ctx, &label)?
                .ok_or_else(|| format!("no tag named \"{}\" in this project", label))?;
            drop(store);
            let args: Vec<OsString> = tag.argv.iter().skip(1).map(OsString::from).collect();
            Ok(shim::run(&tag.tool, &args))
        }
        TagAction::List { tool } => {
            for tag in store.list_tags(&ctx, tool.as_deref())? {
                println!("{}\t{}", tag.label, shim::shell_join(&tag.argv));
            }
            Ok(0)
        }
    }
}

fn export_command(format: Format, tool: Option<&str>, limit: i64) -> CliResult {
    let config = Config::load();
    let store = Store::open()?;
    let ctx = context::detect();
    let normalizer = Normalizer::new(&ctx, dirs::home_dir(), Redactor::from_config(&config.redact));
    let doc = export::build(&store, &ctx, tool, limit, &normalizer)?;
    match format {
        Format::Md => print!("{}", export::render_markdown(&doc)),
        Format::Json => println!("{}", export::render_json(&doc)?),
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_invoked_name() {
        assert_eq!(invoked_name(OsStr::new("/usr/local/bin/ackchyually")), "ackchyually");
        assert_eq!(invoked_name(OsStr::new("shims/git")), "git");
        assert_eq!(invoked_name(OsStr::new("C:/x/ackchyually.EXE")), "ackchyually");
        assert!(is_management_name("ackchyually"));
        assert!(!is_management_name("git"));
    }

    #[test]
    fn test_suggest_subcommand() {
        assert_eq!(suggest_subcommand("shmi"), Some("shim"));
        assert_eq!(suggest_subcommand("exprot"), Some("export"));
        assert_eq!(suggest_subcommand("ver"), Some("version"));
        assert_eq!(suggest_subcommand("tags"), Some("tag"));
        assert_eq!(suggest_subcommand("bset"), Some("best"));
        assert_eq!(suggest_subcommand("zzzzzz"), None);
        assert_eq!(suggest_subcommand(""), None);
    }

    #[test]
    fn test_tag_add_requires_separator() {
        let parsed = Cli::try_parse_from(["ackchyually", "tag", "add", "ci", "--", "make", "test"]).unwrap();
        match parsed.command {
            Command::Tag {
                action: TagAction::Add { label, command },
            } => {
                assert_eq!(label, "ci");
                assert_eq!(command, vec!["make", "test"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_subcommand_is_usage_error() {
        let args: Vec<OsString> = ["ackchyually", "shmi"].iter().map(OsString::from).collect();
        assert_eq!(run(args), EXIT_USAGE);
    }
}
