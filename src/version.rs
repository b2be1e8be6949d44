//! Build information baked in by `build.rs`

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
const COMMIT: &str = env!("ACKCHYUALLY_GIT_COMMIT");
const DIRTY: &str = env!("ACKCHYUALLY_GIT_DIRTY");
const BUILD_EPOCH: &str = env!("ACKCHYUALLY_BUILD_EPOCH");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub commit: String,
    pub dirty: bool,
    pub built: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self::from_parts(VERSION, COMMIT, DIRTY, BUILD_EPOCH)
    }

    fn from_parts(version: &str, commit: &str, dirty: &str, epoch: &str) -> Self {
        let built = epoch
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            version: version.to_string(),
            commit: if commit.is_empty() { "unknown".to_string() } else { commit.to_string() },
            dirty: dirty == "true",
            built,
        }
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dirty = if self.dirty { "-dirty" } else { "" };
        write!(f, "ackchyually {} ({}{}, built {})", self.version, self.commit, dirty, self.built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let info = BuildInfo::from_parts("0.3.2", "0123456789ab", "true", "1700000000");
        assert_eq!(info.to_string(), "ackchyually 0.3.2 (0123456789ab-dirty, built 2023-11-14)");
    }

    #[test]
    fn test_unknown_parts() {
        let info = BuildInfo::from_parts("0.3.2", "", "false", "garbage");
        assert_eq!(info.to_string(), "ackchyually 0.3.2 (unknown, built unknown)");
    }

    #[test]
    fn test_current_uses_package_version() {
        assert_eq!(BuildInfo::current().version, env!("CARGO_PKG_VERSION"));
    }
}
