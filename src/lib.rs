//! packsmith - artifact layout engine
//!
//! Artifacts are trees of packaging elements (directories, archives, file
//! copies, module outputs, libraries and references to other artifacts).
//! packsmith traverses those trees with substitution, orders artifacts by
//! inclusion, detects self-including cycles and edits the artifact set
//! through transactional commits.

pub mod domain;
pub mod storage;
pub mod cli;

pub use domain::{Artifact, ArtifactManager, ElementPath, PackagingElement, PackagingTree};
