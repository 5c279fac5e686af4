// Artifact path construction
//
// Builds destination paths for saved artifacts and guarantees the containing
// directory exists before returning, so strategies can write immediately.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::capture::strategy::TestContext;

/// Maximum characters of a test name used in a directory component
const COMPONENT_MAX_CHARS: usize = 120;

/// Path construction seam used by the lifecycle controller
pub trait PathBuilder: Send + Sync {
    /// Path for an artifact belonging to one test. The containing directory
    /// exists when this returns.
    fn test_artifact(&self, test: &TestContext, filename: &str) -> Result<PathBuf>;

    /// Path for a run-scoped artifact (e.g. the startup recording)
    fn run_artifact(&self, filename: &str) -> Result<PathBuf>;
}

/// Default path layout: one directory per run, one numbered subdirectory per
/// test, run-scoped artifacts at the run directory root.
pub struct ArtifactPaths {
    run_dir: PathBuf,
    /// Stable per-test directory indexes, assigned in first-seen order
    test_indexes: Mutex<HashMap<String, u32>>,
}

impl ArtifactPaths {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            test_indexes: Mutex::new(HashMap::new()),
        }
    }

    /// Create a timestamped run directory layout under `root`
    pub fn for_run(root: &Path) -> Self {
        let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%SZ");
        Self::new(root.join(stamp.to_string()))
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn test_dir(&self, test: &TestContext) -> PathBuf {
        let mut indexes = self.test_indexes.lock().unwrap();
        let next = indexes.len() as u32 + 1;
        let index = *indexes.entry(test.full_name.clone()).or_insert(next);
        self.run_dir
            .join(format!("{} - {}", index, sanitize_component(&test.full_name)))
    }
}

impl PathBuilder for ArtifactPaths {
    fn test_artifact(&self, test: &TestContext, filename: &str) -> Result<PathBuf> {
        let dir = self.test_dir(test);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create test artifact dir: {}", dir.display()))?;
        Ok(dir.join(filename))
    }

    fn run_artifact(&self, filename: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.run_dir).with_context(|| {
            format!("Failed to create run artifact dir: {}", self.run_dir.display())
        })?;
        Ok(self.run_dir.join(filename))
    }
}

/// Reduce a test name to a single safe path component: control characters
/// and path separators become spaces or dashes, runs of whitespace collapse,
/// and the result is capped at COMPONENT_MAX_CHARS.
fn sanitize_component(name: &str) -> String {
    let mut result = String::new();
    let mut chars_added = 0;
    let mut prev_was_space = false;

    for ch in name.chars() {
        if chars_added >= COMPONENT_MAX_CHARS {
            break;
        }
        let sanitized = match ch {
            '/' | '\\' | ':' => '-',
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => ' ',
            other => other,
        };

        if sanitized.is_whitespace() {
            if prev_was_space || result.is_empty() {
                continue;
            }
            result.push(' ');
            prev_was_space = true;
            chars_added += 1;
        } else {
            result.push(sanitized);
            prev_was_space = false;
            chars_added += 1;
        }
    }

    let trimmed = result.trim();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
