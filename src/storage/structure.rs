//! Project structure file
//!
//! Modules and libraries that artifacts can package are declared in
//! `.packsmith/structure.toml`:
//!
//! ```toml
//! [[modules]]
//! name = "core"
//! source_roots = ["core/src"]
//! output = "out/production/core"
//!
//! [[libraries]]
//! name = "serde"
//! level = "project"
//! files = ["libs/serde.jar"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::ConfigError;
use crate::domain::ProjectStructure;

/// Reads and writes the project structure file
pub struct StructureFile {
    path: PathBuf,
}

impl StructureFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".packsmith").join("structure.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the structure; a missing file is an empty structure
    pub fn load(&self) -> Result<ProjectStructure> {
        if !self.path.exists() {
            return Ok(ProjectStructure::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read project structure: {}", self.path.display()))?;

        let structure: ProjectStructure = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project structure")?;

        for module in &structure.modules {
            if module.name.trim().is_empty() {
                return Err(ConfigError::Invalid("module without a name".to_string()).into());
            }
        }
        Ok(structure)
    }

    pub fn save(&self, structure: &ProjectStructure) -> Result<()> {
        let content =
            toml::to_string_pretty(structure).context("Failed to serialize project structure")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write project structure: {}", self.path.display()))
    }
}
