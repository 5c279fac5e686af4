// Capture configuration
// Handles the artifact root location and retention mode, with environment
// variable overrides for harness integration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What to do with captured artifacts once their recording ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    /// Capture nothing at all
    None,
    /// Capture everything, keep only artifacts of failing tests
    Failing,
    /// Capture and keep everything
    All,
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionMode::None => write!(f, "none"),
            RetentionMode::Failing => write!(f, "failing"),
            RetentionMode::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for RetentionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(RetentionMode::None),
            "failing" => Ok(RetentionMode::Failing),
            "all" => Ok(RetentionMode::All),
            _ => Err(format!("unknown retention mode: {}", s)),
        }
    }
}

/// Configuration for a capture run
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory under which per-run artifact directories are created
    pub artifacts_root: PathBuf,
    /// Retention mode for captured artifacts
    pub mode: RetentionMode,
    /// Whether to record the gap between process boot and the first test
    pub record_startup: bool,
}

impl CaptureConfig {
    /// Create configuration using default paths
    pub fn default_paths() -> Self {
        Self {
            artifacts_root: Self::default_artifacts_root(),
            mode: RetentionMode::All,
            record_startup: false,
        }
    }

    /// Create configuration from environment variables, falling back to
    /// defaults:
    /// - RUNCAP_ARTIFACTS_DIR overrides the artifact root
    /// - RUNCAP_RETENTION is one of none|failing|all
    /// - RUNCAP_RECORD_STARTUP enables the startup recording ("1" or "true")
    pub fn from_env() -> Self {
        let mut config = Self::default_paths();

        if let Ok(dir) = std::env::var("RUNCAP_ARTIFACTS_DIR") {
            config.artifacts_root = PathBuf::from(dir);
        }

        if let Ok(mode) = std::env::var("RUNCAP_RETENTION") {
            if let Ok(parsed) = mode.parse() {
                config.mode = parsed;
            }
        }

        if let Ok(flag) = std::env::var("RUNCAP_RECORD_STARTUP") {
            config.record_startup = flag == "1" || flag.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Default artifact root: ~/.runcap/artifacts, or /tmp/runcap/artifacts
    /// if the home directory is unavailable
    fn default_artifacts_root() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".runcap").join("artifacts"))
            .unwrap_or_else(|| PathBuf::from("/tmp/runcap/artifacts"))
    }
}
