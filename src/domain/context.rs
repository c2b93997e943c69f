//! Resolving context
//!
//! Traversals and substitutions never reach into global state. Everything
//! they need to look up (artifacts by name, modules, libraries, artifact
//! types) comes from a [`ResolvingContext`] passed in by the caller.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::artifact::{Artifact, ArtifactTypeId, ArtifactTypeRegistry, TypeSubstitution};
use super::element::{
    ContentKind, ElementRef, LibraryLevel, LibraryRef, PackagingElement, PackagingTree,
};

/// Read access to a set of artifacts
pub trait ArtifactModel {
    /// All artifacts in model order, including ones that failed to load
    fn all_artifacts_including_invalid(&self) -> Vec<Artifact>;

    /// Valid artifacts in model order
    fn artifacts(&self) -> Vec<Artifact> {
        self.all_artifacts_including_invalid()
            .into_iter()
            .filter(|a| a.is_valid())
            .collect()
    }

    /// Finds a valid artifact by exact name
    fn find_artifact(&self, name: &str) -> Option<Artifact> {
        self.all_artifacts_including_invalid()
            .into_iter()
            .find(|a| a.is_valid() && a.name() == name)
    }

    /// Valid artifacts sorted by name, case-insensitively, with exact names
    /// breaking ties
    fn sorted_artifacts(&self) -> Vec<Artifact> {
        let mut artifacts = self.artifacts();
        artifacts.sort_by(|a, b| compare_names(a.name(), b.name()));
        artifacts
    }

    fn artifacts_by_type(&self, artifact_type: &ArtifactTypeId) -> Vec<Artifact> {
        self.artifacts()
            .into_iter()
            .filter(|a| a.artifact_type() == artifact_type)
            .collect()
    }
}

/// Lookups available to traversals and substitutions
pub trait ResolvingContext {
    fn artifact_model(&self) -> &dyn ArtifactModel;

    fn artifact_types(&self) -> &ArtifactTypeRegistry;

    fn structure(&self) -> &ProjectStructure;

    fn find_artifact(&self, name: &str) -> Option<Artifact> {
        self.artifact_model().find_artifact(name)
    }

    fn find_module(&self, name: &str) -> Option<&Module> {
        self.structure().find_module(name)
    }

    fn find_library(&self, library: &LibraryRef) -> Option<&Library> {
        self.structure().find_library(library)
    }
}

/// A source module whose compiled output can be packaged
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub source_roots: Vec<String>,
    #[serde(default)]
    pub test_source_roots: Vec<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub test_output: Option<String>,
}

/// A named set of library files
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub level: LibraryLevel,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl Library {
    pub fn matches(&self, reference: &LibraryRef) -> bool {
        self.name == reference.name
            && self.level == reference.level
            && (reference.level != LibraryLevel::Module || self.module == reference.module)
    }
}

/// Modules and libraries known to the project
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectStructure {
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub libraries: Vec<Library>,
}

impl ProjectStructure {
    pub fn find_module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn find_library(&self, reference: &LibraryRef) -> Option<&Library> {
        self.libraries.iter().find(|l| l.matches(reference))
    }
}

impl Module {
    /// Source roots covered by the given content kind
    pub fn source_roots_for(&self, content: ContentKind) -> &[String] {
        match content {
            ContentKind::Production => &self.source_roots,
            ContentKind::Test => &self.test_source_roots,
        }
    }

    pub fn output_for(&self, content: ContentKind) -> Option<&str> {
        match content {
            ContentKind::Production => self.output.as_deref(),
            ContentKind::Test => self.test_output.as_deref(),
        }
    }
}

/// Case-insensitive name order, total over names that differ only in case
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Returns the elements a complex element stands for when placed inside an
/// artifact of `artifact_type`.
///
/// `None` means the element cannot be expanded here: it is not complex, its
/// target is missing, or its artifact type keeps it opaque.
pub fn resolve_substitution(
    element: &ElementRef,
    ctx: &dyn ResolvingContext,
    artifact_type: &ArtifactTypeId,
) -> Option<Vec<ElementRef>> {
    match element.element() {
        PackagingElement::Artifact { artifact_name } => {
            let artifact = ctx.find_artifact(artifact_name)?;
            let rule = ctx
                .artifact_types()
                .find(artifact.artifact_type())
                .map(|t| t.substitution);
            let substitution = match rule {
                Some(rule) => rule(&artifact, ctx, artifact_type),
                None => TypeSubstitution::Default,
            };
            match substitution {
                TypeSubstitution::Elements(elements) => Some(elements),
                TypeSubstitution::Opaque => None,
                TypeSubstitution::Default => {
                    let root = artifact.root_ref();
                    if *root.element() == PackagingElement::ArtifactRoot {
                        Some(root.children())
                    } else {
                        Some(vec![root])
                    }
                }
            }
        }
        PackagingElement::Library(reference) => {
            let library = ctx.find_library(reference)?;
            Some(library_elements(library))
        }
        _ => None,
    }
}

/// Builds a fresh tree holding one copy element per library file
fn library_elements(library: &Library) -> Vec<ElementRef> {
    let mut tree = PackagingTree::with_artifact_root();
    let root = tree.root();
    for file in &library.files {
        let element = match file.strip_suffix('/') {
            Some(dir) => PackagingElement::directory_copy(dir),
            None => PackagingElement::file_copy(file.as_str()),
        };
        // Adding a leaf to the root cannot fail.
        let _ = tree.add_child(root, element);
    }
    ElementRef::root_of(&Arc::new(tree)).children()
}

/// Returns the module's source roots for a module output element
pub fn module_source_roots(element: &PackagingElement, ctx: &dyn ResolvingContext) -> Vec<String> {
    match element {
        PackagingElement::ModuleOutput {
            module_name,
            content,
        } => ctx
            .find_module(module_name)
            .map(|m| m.source_roots_for(*content).to_vec())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::domain::artifact::{ArtifactData, ArtifactHandle};

    /// Fixed set of artifacts for exercising traversals
    pub struct FixedContext {
        pub artifacts: Vec<Artifact>,
        pub types: ArtifactTypeRegistry,
        pub structure: ProjectStructure,
    }

    impl FixedContext {
        pub fn new(artifacts: Vec<ArtifactData>) -> Self {
            Self {
                artifacts: artifacts
                    .into_iter()
                    .enumerate()
                    .map(|(i, data)| Artifact::new(ArtifactHandle(i as u64), 0, Arc::new(data)))
                    .collect(),
                types: ArtifactTypeRegistry::with_builtin_types(),
                structure: ProjectStructure::default(),
            }
        }
    }

    impl ArtifactModel for FixedContext {
        fn all_artifacts_including_invalid(&self) -> Vec<Artifact> {
            self.artifacts.clone()
        }
    }

    impl ResolvingContext for FixedContext {
        fn artifact_model(&self) -> &dyn ArtifactModel {
            self
        }

        fn artifact_types(&self) -> &ArtifactTypeRegistry {
            &self.types
        }

        fn structure(&self) -> &ProjectStructure {
            &self.structure
        }
    }
}
