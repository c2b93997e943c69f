//! Configuration handling for packsmith
//!
//! Configuration is stored in `.packsmith/config.toml` (project) and
//! `~/.config/packsmith/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::util;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory (relative to the project root) that holds artifact outputs
    pub output_dir: String,

    /// Artifact type used by `packsmith artifact new` without `--type`
    pub default_artifact_type: String,

    /// Whether new artifacts are built on make
    pub build_on_make: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            output_dir: "out".to_string(),
            default_artifact_type: "plain".to_string(),
            build_on_make: false,
        }
    }
}

impl ProjectConfig {
    /// Rejects values that cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("output_dir cannot be empty".to_string()));
        }
        if self.default_artifact_type.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_artifact_type cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Log filter used when neither `--verbose` nor `PACKSMITH_LOG` is set
    pub log_filter: Option<String>,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let (project, project_root) = Self::load_project()?;

        Ok(Self {
            project,
            global,
            project_root,
        })
    }

    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
            project_root: Some(project_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "packsmith", "packsmith").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Finds and loads project configuration
    fn load_project() -> Result<(ProjectConfig, Option<PathBuf>)> {
        match Self::find_project_root() {
            Some(root) => {
                let config = Self::load_project_config(&root)?;
                Ok((config, Some(root)))
            }
            None => Ok((ProjectConfig::default(), None)),
        }
    }

    /// Loads project configuration from a specific root
    fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(".packsmith").join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")?;
        config.validate().context("Invalid project config")?;
        Ok(config)
    }

    /// Finds the project root by looking for a `.packsmith/` directory
    pub fn find_project_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_root_from(&current)
    }

    /// Walks up from `start` looking for a `.packsmith/` directory
    pub fn find_project_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(".packsmith").is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns true if we're in a packsmith project
    pub fn is_in_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Returns the project root, or an error if not in a project
    pub fn require_project_root(&self) -> Result<&Path> {
        self.project_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in a packsmith project. Run 'packsmith init' first."))
    }

    /// Absolute output root for artifacts
    pub fn output_root(&self) -> Option<PathBuf> {
        let dir = Path::new(&self.project.output_dir);
        if dir.is_absolute() {
            return Some(dir.to_path_buf());
        }
        self.project_root.as_ref().map(|root| root.join(dir))
    }

    /// Default output path for a new artifact
    pub fn default_output_path(&self, artifact_name: &str) -> Option<String> {
        self.output_root()
            .map(|root| util::default_artifact_output_path(artifact_name, &root.to_string_lossy()))
    }

    /// Saves the project configuration
    pub fn save_project(&self) -> Result<()> {
        let root = self.require_project_root()?;
        let config_path = root.join(".packsmith").join("config.toml");

        let content =
            toml::to_string_pretty(&self.project).context("Failed to serialize project config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write project config: {}", config_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config {
            project: ProjectConfig::default(),
            global: GlobalConfig::default(),
            project_root: None,
        };

        assert_eq!(config.project.output_dir, "out");
        assert_eq!(config.project.default_artifact_type, "plain");
        assert!(!config.project.build_on_make);
        assert_eq!(config.global.default_format, OutputFormat::Text);
        assert!(config.output_root().is_none());
    }

    #[test]
    fn parse_project_config() {
        let toml = r#"
output_dir = "build"
default_artifact_type = "zip"
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.output_dir, "build");
        assert_eq!(config.default_artifact_type, "zip");
        assert!(!config.build_on_make);
    }

    #[test]
    fn parse_global_config() {
        let toml = r#"
default_format = "json"
log_filter = "packsmith=debug"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
        assert_eq!(config.log_filter.as_deref(), Some("packsmith=debug"));
    }

    #[test]
    fn empty_output_dir_is_invalid() {
        let config = ProjectConfig {
            output_dir: " ".to_string(),
            ..ProjectConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn find_project_root_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".packsmith")).unwrap();
        let sub_dir = dir.path().join("sub").join("dir");
        fs::create_dir_all(&sub_dir).unwrap();

        let root = Config::find_project_root_from(&sub_dir);
        assert_eq!(root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn default_output_path_uses_output_root() {
        let config = Config {
            project: ProjectConfig::default(),
            global: GlobalConfig::default(),
            project_root: Some(PathBuf::from("/work/app")),
        };

        assert_eq!(
            config.default_output_path("My App").as_deref(),
            Some("/work/app/out/artifacts/My_App")
        );
    }

    #[test]
    fn config_not_in_project() {
        let config = Config {
            project: ProjectConfig::default(),
            global: GlobalConfig::default(),
            project_root: None,
        };

        assert!(!config.is_in_project());
        assert!(config.require_project_root().is_err());
    }
}
