//! JSONL storage for artifacts
//!
//! Artifacts are stored in `.packsmith/artifacts.jsonl` with one artifact
//! state per line, in model order. Uses file locking for concurrent access
//! safety.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::domain::ArtifactState;

/// Store for artifact states in JSONL format
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    /// Creates a new artifact store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".packsmith").join("artifacts.jsonl"))
    }

    /// Returns the path to the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all artifact states, in file order
    pub fn read_all(&self) -> Result<Vec<ArtifactState>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open artifact store: {}", self.path.display()))?;

        // Acquire shared lock for reading
        file.lock_shared()
            .context("Failed to acquire read lock on artifact store")?;

        let reader = BufReader::new(&file);
        let mut states = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

            if line.trim().is_empty() {
                continue;
            }

            let state: ArtifactState = serde_json::from_str(&line).with_context(|| {
                format!("Failed to parse {} at line {}", describe_line(&line), line_num + 1)
            })?;
            states.push(state);
        }

        Ok(states)
    }

    /// Writes all artifact states (full rewrite)
    pub fn write_all(&self, states: &[ArtifactState]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = self.path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire write lock on artifact store")?;

            let mut writer = BufWriter::new(&file);
            for state in states {
                let line = serde_json::to_string(state)
                    .with_context(|| format!("Failed to serialize artifact '{}'", state.name))?;
                writeln!(writer, "{}", line).context("Failed to write artifact")?;
            }

            writer.flush().context("Failed to flush artifact store")?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }
}

/// Names the artifact on a line that is JSON but not a valid artifact state
fn describe_line(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("name")?.as_str().map(str::to_string))
        .map(|name| format!("artifact '{}'", name))
        .unwrap_or_else(|| "artifact".to_string())
}
