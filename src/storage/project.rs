//! Project management
//!
//! Handles project initialization and provides access to stores and the
//! artifact model.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use super::{ArtifactStore, Config, StructureFile};
use crate::domain::{ArtifactManager, LoadReport};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a packsmith project. Run 'packsmith init' first.")]
    NotInProject,

    #[error("Failed to create project: {0}")]
    CreateFailed(String),
}

/// A packsmith project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join(".packsmith").is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(ProjectError::CreateFailed(format!("{} is not a directory", root.display())).into());
        }
        let data_dir = root.join(".packsmith");

        fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create .packsmith directory: {}", data_dir.display())
        })?;

        let config_path = data_dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# packsmith configuration

# Directory for artifact outputs, relative to the project root
output_dir = "out"

# Artifact type for 'packsmith artifact new'
default_artifact_type = "plain"

# Build new artifacts on make
build_on_make = false
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let structure_path = data_dir.join("structure.toml");
        if !structure_path.exists() {
            let structure = r#"# Modules and libraries that artifacts can package
#
# [[modules]]
# name = "core"
# source_roots = ["core/src"]
# output = "out/production/core"
#
# [[libraries]]
# name = "serde"
# level = "project"
# files = ["libs/serde.jar"]
"#;
            fs::write(&structure_path, structure).with_context(|| {
                format!("Failed to write project structure: {}", structure_path.display())
            })?;
        }

        let store = ArtifactStore::for_project(&root);
        if !store.path().exists() {
            store.write_all(&[])?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .packsmith directory path
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(".packsmith")
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the artifact store
    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::for_project(&self.root)
    }

    /// Returns the project structure file
    pub fn structure_file(&self) -> StructureFile {
        StructureFile::for_project(&self.root)
    }

    /// Builds an artifact manager holding the persisted artifacts
    pub fn load_artifacts(&self) -> Result<(ArtifactManager, LoadReport)> {
        let structure = self.structure_file().load()?;
        let manager = ArtifactManager::with_builtin_types(structure);
        let states = self.artifact_store().read_all()?;
        let report = manager.load(states);
        debug!(
            valid = report.valid,
            invalid = report.invalid.len(),
            "loaded artifacts"
        );
        Ok((manager, report))
    }

    /// Persists the live artifacts of `manager`
    pub fn save_artifacts(&self, manager: &ArtifactManager) -> Result<()> {
        self.artifact_store()
            .write_all(&manager.states())
            .context("Failed to save artifacts")
    }

    /// Returns a path relative to the project root, if inside it
    pub fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(|p| p.to_path_buf())
    }
}
