// Run manifest persistence
// Records every artifact saved during a run and persists the index to
// manifest.json with file locking, so post-run tooling can find artifacts
// without walking the directory tree.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::capture::handle::{CaptureId, CaptureKind};

/// One saved artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub capture_id: CaptureId,
    pub kind: CaptureKind,
    /// Full name of the owning test; absent for run-scoped artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_full_name: Option<String>,
    pub path: PathBuf,
    pub saved_at: DateTime<Utc>,
}

/// Index of artifacts saved during one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunManifest {
    pub artifacts: Vec<ArtifactRecord>,
}

impl RunManifest {
    /// Load a manifest from disk, returning an empty one if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut file = File::open(path)
            .with_context(|| format!("Failed to open manifest: {}", path.display()))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    /// Save the manifest to disk with exclusive file locking
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create manifest directory: {}", parent.display())
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to open manifest for writing: {}", path.display()))?;

        file.lock_exclusive()
            .with_context(|| "Failed to acquire exclusive lock on manifest")?;

        let contents =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize manifest")?;

        file.write_all(contents.as_bytes())
            .with_context(|| "Failed to write manifest")?;

        // Lock is released when file is dropped
        Ok(())
    }

    /// Append a saved artifact
    pub fn record(&mut self, record: ArtifactRecord) {
        self.artifacts.push(record);
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
