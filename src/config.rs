//! Configuration file support for ackchyually
//!
//! Reads `<data-dir>/config.toml`, then applies environment knobs on top.

use serde::{Deserialize, Serialize};

use crate::paths;

/// Forces PTY mode even when stdio is not a terminal (tests only)
pub const FORCE_TTY_ENV: &str = "ACKCHYUALLY_FORCE_TTY";

/// Runs the picked suggestion instead of only printing it
pub const AUTO_EXEC_ENV: &str = "ACKCHYUALLY_AUTO_EXEC";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Suggestion settings
    #[serde(default)]
    pub suggest: SuggestConfig,

    /// Extra redaction rules layered on the built-in set
    #[serde(default)]
    pub redact: RedactConfig,
}

/// Suggestion-related configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SuggestConfig {
    /// How many distinct prior successes the shim hands to the scorer
    /// Default: 200
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: i64,

    /// How many commands `ackchyually best` prints
    /// Default: 5
    #[serde(default = "default_best_limit")]
    pub best_limit: usize,

    /// Run the picked suggestion automatically
    /// Default: false
    #[serde(default)]
    pub auto_exec: bool,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RedactConfig {
    /// Additional flag names whose values are sensitive (e.g. "--secret")
    #[serde(default)]
    pub extra_flags: Vec<String>,

    /// Additional case-insensitive regexes for credential-shaped text
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

fn default_candidate_limit() -> i64 {
    200
}

fn default_best_limit() -> usize {
    5
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            best_limit: default_best_limit(),
            auto_exec: false,
        }
    }
}

impl Config {
    /// Load config from `<data-dir>/config.toml` and apply env overrides.
    /// Returns defaults if the file is missing or malformed.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        if env_flag(AUTO_EXEC_ENV) {
            config.suggest.auto_exec = true;
        }
        config
    }

    fn load_file() -> Self {
        let path = paths::config_path();
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
                Self::default()
            }
        }
    }
}

/// True when the variable is set to `1`, `true`, `yes` or `on`.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.suggest.candidate_limit, 200);
        assert_eq!(config.suggest.best_limit, 5);
        assert!(!config.suggest.auto_exec);
        assert!(config.redact.extra_flags.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[suggest]
best_limit = 3

[redact]
extra_flags = ["--secret"]
extra_patterns = ["corp_[a-z0-9]{12}"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.suggest.best_limit, 3);
        assert_eq!(config.suggest.candidate_limit, 200);
        assert_eq!(config.redact.extra_flags, vec!["--secret".to_string()]);
        assert_eq!(config.redact.extra_patterns.len(), 1);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: Config = toml::from_str("[redact]\n").unwrap();
        assert_eq!(config.suggest.best_limit, 5);
    }
}
