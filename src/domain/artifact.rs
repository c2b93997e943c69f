//! Artifacts and artifact types
//!
//! An artifact is a named, typed output layout: a root packaging tree plus
//! its build settings. Artifact data is immutable once shared; edits go
//! through copy-on-write (`Arc::make_mut`) in the modifiable model so that
//! live snapshots never observe uncommitted changes.
//!
//! Artifact types are a strategy table ([`ArtifactTypeRegistry`]) that
//! controls how a new artifact's root is created, where its output goes by
//! default, and how an embedded reference to it is substituted.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::ResolvingContext;
use super::element::{ElementRef, PackagingElement, PackagingTree};
use super::state::ArtifactState;
use super::util;

/// Stable identity of an artifact inside a manager, kept across renames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactHandle(pub(crate) u64);

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "artifact-{}", self.0)
    }
}

/// Persisted identifier of an artifact type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactTypeId(String);

impl ArtifactTypeId {
    pub const PLAIN: &'static str = "plain";
    pub const ZIP: &'static str = "zip";
    pub const EXPLODED: &'static str = "exploded";
    pub const INVALID: &'static str = "invalid";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn plain() -> Self {
        Self::new(Self::PLAIN)
    }

    pub fn zip() -> Self {
        Self::new(Self::ZIP)
    }

    pub fn exploded() -> Self {
        Self::new(Self::EXPLODED)
    }

    pub fn invalid() -> Self {
        Self::new(Self::INVALID)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an artifact could not be loaded, with its raw persisted state
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidArtifact {
    pub message: String,
    pub state: ArtifactState,
}

/// The content of an artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactData {
    name: String,
    artifact_type: ArtifactTypeId,
    root: Arc<PackagingTree>,
    build_on_make: bool,
    output_path: Option<String>,
    properties: BTreeMap<String, serde_json::Value>,
    invalid: Option<InvalidArtifact>,
}

impl ArtifactData {
    pub fn new(name: impl Into<String>, artifact_type: ArtifactTypeId, root: PackagingTree) -> Self {
        Self {
            name: name.into(),
            artifact_type,
            root: Arc::new(root),
            build_on_make: false,
            output_path: None,
            properties: BTreeMap::new(),
            invalid: None,
        }
    }

    /// Placeholder for an artifact whose state could not be loaded
    pub fn invalid(state: ArtifactState, message: impl Into<String>) -> Self {
        Self {
            name: state.name.clone(),
            artifact_type: ArtifactTypeId::invalid(),
            root: Arc::new(PackagingTree::with_artifact_root()),
            build_on_make: false,
            output_path: state.output_path.clone(),
            properties: BTreeMap::new(),
            invalid: Some(InvalidArtifact {
                message: message.into(),
                state,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn artifact_type(&self) -> &ArtifactTypeId {
        &self.artifact_type
    }

    pub fn set_artifact_type(&mut self, artifact_type: ArtifactTypeId) {
        self.artifact_type = artifact_type;
    }

    pub fn root_tree(&self) -> &Arc<PackagingTree> {
        &self.root
    }

    /// Returns a reference to the root element
    pub fn root_ref(&self) -> ElementRef {
        ElementRef::root_of(&self.root)
    }

    pub fn root_element(&self) -> &PackagingElement {
        self.root.root_element()
    }

    /// Mutable access to the root tree, cloning it if it is shared
    pub fn root_mut(&mut self) -> &mut PackagingTree {
        Arc::make_mut(&mut self.root)
    }

    pub fn set_root(&mut self, root: PackagingTree) {
        self.root = Arc::new(root);
    }

    pub fn build_on_make(&self) -> bool {
        self.build_on_make
    }

    pub fn set_build_on_make(&mut self, build_on_make: bool) {
        self.build_on_make = build_on_make;
    }

    pub fn output_path(&self) -> Option<&str> {
        self.output_path.as_deref()
    }

    pub fn set_output_path(&mut self, output_path: Option<String>) {
        self.output_path = output_path;
    }

    /// The full path of the produced file or directory
    pub fn output_file_path(&self) -> Option<String> {
        let output = self.output_path.as_deref()?;
        match self.root_element() {
            PackagingElement::Archive { name } => Some(util::append_to_path(output, name)),
            _ => Some(output.to_string()),
        }
    }

    pub fn properties(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.properties.insert(key.into(), value);
    }

    pub fn remove_property(&mut self, key: &str) -> Option<serde_json::Value> {
        self.properties.remove(key)
    }

    pub fn is_valid(&self) -> bool {
        self.invalid.is_none()
    }

    pub fn invalid_info(&self) -> Option<&InvalidArtifact> {
        self.invalid.as_ref()
    }

    /// True when the output is a plain directory whose stale content should be
    /// cleared before a rebuild
    pub fn should_clear_output_before_rebuild(&self) -> bool {
        self.output_path.as_deref().is_some_and(|p| !p.is_empty())
            && *self.root_element() == PackagingElement::ArtifactRoot
    }
}

/// A snapshot of one artifact: its stable handle plus the data of one
/// generation
#[derive(Debug, Clone)]
pub struct Artifact {
    handle: ArtifactHandle,
    generation: u64,
    data: Arc<ArtifactData>,
}

impl Artifact {
    pub(crate) fn new(handle: ArtifactHandle, generation: u64, data: Arc<ArtifactData>) -> Self {
        Self {
            handle,
            generation,
            data,
        }
    }

    pub fn handle(&self) -> ArtifactHandle {
        self.handle
    }

    /// Commit generation of the data this snapshot holds
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn data(&self) -> &Arc<ArtifactData> {
        &self.data
    }
}

impl Deref for Artifact {
    type Target = ArtifactData;

    fn deref(&self) -> &ArtifactData {
        &self.data
    }
}

/// Result of an artifact type's substitution rule
#[derive(Debug, Clone)]
pub enum TypeSubstitution {
    /// Use the default: the root's children for an artifact root, the root otherwise
    Default,
    /// Use these elements
    Elements(Vec<ElementRef>),
    /// The artifact cannot be expanded inside this parent type
    Opaque,
}

pub type RootFactory = fn(&str) -> PackagingTree;
pub type OutputPathRule = fn(&str, &str) -> String;
pub type SubstitutionRule = fn(&Artifact, &dyn ResolvingContext, &ArtifactTypeId) -> TypeSubstitution;

/// Strategy entry for one artifact type
#[derive(Clone)]
pub struct ArtifactType {
    pub id: ArtifactTypeId,
    pub presentable_name: String,
    pub create_root: RootFactory,
    pub default_output_path: OutputPathRule,
    pub substitution: SubstitutionRule,
}

impl fmt::Debug for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactType")
            .field("id", &self.id)
            .field("presentable_name", &self.presentable_name)
            .finish()
    }
}

fn artifact_root(_name: &str) -> PackagingTree {
    PackagingTree::with_artifact_root()
}

fn zip_root(name: &str) -> PackagingTree {
    let archive = PackagingElement::archive(format!("{}.zip", util::suggest_artifact_file_name(name)));
    PackagingTree::with_root(archive).unwrap_or_else(|_| PackagingTree::with_artifact_root())
}

fn default_substitution(_: &Artifact, _: &dyn ResolvingContext, _: &ArtifactTypeId) -> TypeSubstitution {
    TypeSubstitution::Default
}

fn exploded_substitution(
    artifact: &Artifact,
    _: &dyn ResolvingContext,
    parent_type: &ArtifactTypeId,
) -> TypeSubstitution {
    if parent_type.as_str() == ArtifactTypeId::ZIP {
        TypeSubstitution::Elements(artifact.root_ref().children())
    } else {
        TypeSubstitution::Opaque
    }
}

/// Lookup table of artifact types
#[derive(Debug, Clone)]
pub struct ArtifactTypeRegistry {
    types: Vec<ArtifactType>,
}

impl ArtifactTypeRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// Registry with the `plain`, `zip` and `exploded` types
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::empty();
        registry.register(ArtifactType {
            id: ArtifactTypeId::plain(),
            presentable_name: "Plain directory".to_string(),
            create_root: artifact_root,
            default_output_path: util::default_artifact_output_path,
            substitution: default_substitution,
        });
        registry.register(ArtifactType {
            id: ArtifactTypeId::zip(),
            presentable_name: "Zip archive".to_string(),
            create_root: zip_root,
            default_output_path: util::default_artifact_output_path,
            substitution: default_substitution,
        });
        registry.register(ArtifactType {
            id: ArtifactTypeId::exploded(),
            presentable_name: "Exploded directory".to_string(),
            create_root: artifact_root,
            default_output_path: util::default_artifact_output_path,
            substitution: exploded_substitution,
        });
        registry
    }

    /// Adds a type, replacing any type with the same id
    pub fn register(&mut self, artifact_type: ArtifactType) {
        self.types.retain(|t| t.id != artifact_type.id);
        self.types.push(artifact_type);
    }

    pub fn find(&self, id: &ArtifactTypeId) -> Option<&ArtifactType> {
        self.types.iter().find(|t| &t.id == id)
    }

    pub fn find_by_str(&self, id: &str) -> Option<&ArtifactType> {
        self.types.iter().find(|t| t.id.as_str() == id)
    }

    pub fn all(&self) -> &[ArtifactType] {
        &self.types
    }
}

impl Default for ArtifactTypeRegistry {
    fn default() -> Self {
        Self::with_builtin_types()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_are_registered() {
        let registry = ArtifactTypeRegistry::with_builtin_types();
        let ids: Vec<_> = registry.all().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["plain", "zip", "exploded"]);
        assert!(registry.find(&ArtifactTypeId::invalid()).is_none());
    }

    #[test]
    fn zip_root_is_named_archive() {
        let registry = ArtifactTypeRegistry::with_builtin_types();
        let zip = registry.find_by_str("zip").unwrap();
        let root = (zip.create_root)("My App");
        assert_eq!(root.root_element(), &PackagingElement::archive("My_App.zip"));
    }

    #[test]
    fn register_replaces_same_id() {
        let mut registry = ArtifactTypeRegistry::with_builtin_types();
        let mut plain = registry.find_by_str("plain").unwrap().clone();
        plain.presentable_name = "Custom".to_string();
        registry.register(plain);
        assert_eq!(registry.all().len(), 3);
        assert_eq!(registry.find_by_str("plain").unwrap().presentable_name, "Custom");
    }

    #[test]
    fn data_equality_is_structural() {
        let a = ArtifactData::new("App", ArtifactTypeId::plain(), PackagingTree::with_artifact_root());
        let mut b = a.clone();
        assert_eq!(a, b);
        let root = b.root_mut().root();
        b.root_mut()
            .add_child(root, PackagingElement::directory("lib"))
            .unwrap();
        assert_ne!(a, b);
        assert!(a.root_tree().is_empty());
    }

    #[test]
    fn root_mut_copies_shared_tree() {
        let a = ArtifactData::new("App", ArtifactTypeId::plain(), PackagingTree::with_artifact_root());
        let mut b = a.clone();
        let before = a.root_tree().id();
        let after = b.root_mut().id();
        assert_ne!(before, after);
    }

    #[test]
    fn output_file_path_includes_archive_name() {
        let mut data = ArtifactData::new(
            "App",
            ArtifactTypeId::zip(),
            PackagingTree::with_root(PackagingElement::archive("app.zip")).unwrap(),
        );
        assert_eq!(data.output_file_path(), None);
        data.set_output_path(Some("/out/app".to_string()));
        assert_eq!(data.output_file_path().as_deref(), Some("/out/app/app.zip"));
        assert!(!data.should_clear_output_before_rebuild());
    }

    #[test]
    fn invalid_artifact_keeps_state() {
        let state: ArtifactState = serde_json::from_str(
            r#"{"name":"Broken","type":"war","root":{"id":"root"}}"#,
        )
        .unwrap();
        let data = ArtifactData::invalid(state.clone(), "Unknown artifact type: war");
        assert!(!data.is_valid());
        assert_eq!(data.name(), "Broken");
        assert_eq!(data.invalid_info().unwrap().state, state);
    }
}
