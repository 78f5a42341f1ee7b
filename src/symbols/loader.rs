//! Loading symbol snapshots from disk.
//!
//! A host compiler plugin dumps one JSON document per compilation (or one per
//! source set). `SnapshotLoader` accepts either a single document or a
//! directory, in which case every `*.json` file below it is merged into one
//! snapshot.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{KirokError, Result};

use super::{Snapshot, SnapshotFile, SourceFile};

pub struct SnapshotLoader {
    /// File names skipped during directory walks (e.g. a previously written manifest)
    skip_names: Vec<String>,
}

impl SnapshotLoader {
    pub fn new() -> Self {
        Self {
            skip_names: Vec::new(),
        }
    }

    pub fn skipping(mut self, file_name: impl Into<String>) -> Self {
        self.skip_names.push(file_name.into());
        self
    }

    pub fn load(&self, path: &Path) -> Result<Snapshot> {
        if path.is_dir() {
            let files = self.walk(path)?;
            tracing::debug!("Merging {} snapshot files from {}", files.len(), path.display());

            let mut sources: Vec<SourceFile> = Vec::new();
            for file in &files {
                sources.extend(Self::read_file(file)?.files);
            }
            Snapshot::from_files(sources)
        } else if path.is_file() {
            Snapshot::from_snapshot_file(Self::read_file(path)?)
        } else {
            Err(KirokError::Snapshot(format!(
                "Snapshot not found: {}",
                path.display()
            )))
        }
    }

    /// Snapshot documents below `root`, sorted by path.
    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .ignore(true)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if path.is_file() && self.is_snapshot(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    fn is_snapshot(&self, path: &Path) -> bool {
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let skipped = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| self.skip_names.iter().any(|s| s == n))
            .unwrap_or(false);
        is_json && !skipped
    }

    fn read_file(path: &Path) -> Result<SnapshotFile> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            KirokError::Snapshot(format!("Invalid snapshot {}: {}", path.display(), e))
        })
    }
}

impl Default for SnapshotLoader {
    fn default() -> Self {
        Self::new()
    }
}
