//! # Storage Layer
//!
//! Persistence layer for packsmith with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Artifacts | JSONL (one artifact per line) | `.packsmith/artifacts.jsonl` |
//! | Modules and libraries | TOML | `.packsmith/structure.toml` |
//! | Config | TOML | `.packsmith/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`ArtifactStore`] uses file locking (`fs2`) for concurrent access
//! - All artifact writes are atomic (temp file + rename)
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a packsmith project
//! - [`ArtifactStore`] - Read/write artifact states as JSONL
//! - [`StructureFile`] - Read/write the project structure
//! - [`Config`] - Project and global configuration

mod config;
mod project;
mod store;
mod structure;

pub use config::{Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig};
pub use project::{Project, ProjectError};
pub use store::ArtifactStore;
pub use structure::StructureFile;
