//! Domain models for packsmith
//!
//! Contains the packaging engine without any I/O concerns: element trees,
//! traversal, substitution, the artifact graph and the transactional model.

pub mod artifact;
pub mod context;
pub mod element;
pub mod graph;
pub mod model;
pub mod path;
pub mod pointer;
pub mod processor;
pub mod sorting;
pub mod state;
pub mod util;

pub use artifact::{
    Artifact, ArtifactData, ArtifactHandle, ArtifactType, ArtifactTypeId, ArtifactTypeRegistry,
    InvalidArtifact, TypeSubstitution,
};
pub use context::{ArtifactModel, Library, Module, ProjectStructure, ResolvingContext};
pub use element::{
    ContentKind, ElementCategory, ElementError, ElementId, ElementRef, ElementType, LibraryLevel,
    LibraryRef, PackagingElement, PackagingTree,
};
pub use graph::{ArtifactGraph, GraphError};
pub use model::{
    ArtifactEvent, ArtifactListener, ArtifactManager, CommitSummary, LoadReport, ModelError,
    ModelSnapshot, ModifiableArtifactModel,
};
pub use path::ElementPath;
pub use pointer::{ArtifactPointer, ArtifactPointerManager};
pub use processor::{from_fn, ElementProcessor};
pub use sorting::SortedArtifacts;
pub use state::{ArtifactState, ElementState, ElementTypeRegistry, StateError};
