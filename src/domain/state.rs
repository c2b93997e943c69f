//! Persisted artifact state
//!
//! Element trees are stored as nested JSON objects:
//!
//! ```json
//! {"id": "directory", "name": "lib", "children": [
//!     {"id": "file-copy", "path": "/libs/a.jar"}
//! ]}
//! ```
//!
//! `id` is the element type id, scalar fields are string attributes, and
//! composites nest their children in order. Elements are created from this
//! state through an [`ElementTypeRegistry`]; a type id the registry does not
//! know fails only the artifact that uses it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::artifact::{ArtifactData, ArtifactTypeId, ArtifactTypeRegistry};
use super::element::{
    ContentKind, ElementId, ElementType, LibraryLevel, PackagingElement, PackagingTree,
};

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("Unknown element type: {0}")]
    UnknownElementType(String),

    #[error("Unknown artifact type: {0}")]
    UnknownArtifactType(String),

    #[error("Element '{element}' is missing attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Element '{element}' has invalid {attribute}: {value}")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    #[error("Element '{0}' cannot have children")]
    UnexpectedChildren(String),

    #[error("The artifact root can only be the top of a tree")]
    NestedRoot,

    #[error("Root element must be a composite, got '{0}'")]
    RootNotComposite(String),
}

/// Persisted form of one element and its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    #[serde(rename = "id")]
    pub type_id: String,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementState>,
}

impl ElementState {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    fn required(&self, element: &'static str, attribute: &'static str) -> Result<&str, StateError> {
        self.attributes
            .get(attribute)
            .map(String::as_str)
            .ok_or(StateError::MissingAttribute { element, attribute })
    }

    fn optional(&self, attribute: &str) -> Option<String> {
        self.attributes.get(attribute).cloned()
    }
}

/// Persisted form of one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactState {
    pub name: String,

    #[serde(rename = "type")]
    pub artifact_type: String,

    #[serde(default)]
    pub build_on_make: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,

    pub root: ElementState,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Creates an element from its persisted attributes
pub type ElementLoader = fn(&ElementState) -> Result<PackagingElement, StateError>;

/// Registry entry for one element type
#[derive(Debug, Clone, Copy)]
pub struct ElementTypeDescriptor {
    pub element_type: ElementType,
    pub load: ElementLoader,
}

impl ElementTypeDescriptor {
    pub fn id(&self) -> &'static str {
        self.element_type.id()
    }
}

/// Lookup table from element type id to loader
#[derive(Debug, Clone)]
pub struct ElementTypeRegistry {
    types: Vec<ElementTypeDescriptor>,
}

impl ElementTypeRegistry {
    pub fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// Registry with every built-in element type
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::empty();
        for element_type in ElementType::ALL {
            registry.register(ElementTypeDescriptor {
                element_type,
                load: builtin_loader(element_type),
            });
        }
        registry
    }

    /// Adds a descriptor, replacing any with the same id
    pub fn register(&mut self, descriptor: ElementTypeDescriptor) {
        self.types.retain(|d| d.id() != descriptor.id());
        self.types.push(descriptor);
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.types.len();
        self.types.retain(|d| d.id() != id);
        self.types.len() != before
    }

    pub fn find(&self, id: &str) -> Option<&ElementTypeDescriptor> {
        self.types.iter().find(|d| d.id() == id)
    }

    pub fn all(&self) -> &[ElementTypeDescriptor] {
        &self.types
    }

    /// Creates a single element from its state, ignoring children
    pub fn create(&self, state: &ElementState) -> Result<PackagingElement, StateError> {
        let descriptor = self
            .find(&state.type_id)
            .ok_or_else(|| StateError::UnknownElementType(state.type_id.clone()))?;
        (descriptor.load)(state)
    }
}

impl Default for ElementTypeRegistry {
    fn default() -> Self {
        Self::with_builtin_types()
    }
}

fn builtin_loader(element_type: ElementType) -> ElementLoader {
    match element_type {
        ElementType::Root => |_| Ok(PackagingElement::ArtifactRoot),
        ElementType::Directory => |s| Ok(PackagingElement::directory(s.required("directory", "name")?)),
        ElementType::Archive => |s| Ok(PackagingElement::archive(s.required("archive", "name")?)),
        ElementType::FileCopy => |s| {
            Ok(PackagingElement::FileCopy {
                path: s.required("file-copy", "path")?.to_string(),
                output_name: s.optional("output_name"),
            })
        },
        ElementType::DirCopy => |s| Ok(PackagingElement::directory_copy(s.required("dir-copy", "path")?)),
        ElementType::ExtractedDir => |s| {
            Ok(PackagingElement::extracted_directory(
                s.required("extracted-dir", "archive_path")?,
                s.optional("path_in_archive").unwrap_or_else(|| "/".to_string()),
            ))
        },
        ElementType::Artifact => |s| Ok(PackagingElement::artifact(s.required("artifact", "artifact_name")?)),
        ElementType::ModuleOutput => |s| {
            let content = match s.attributes.get("content") {
                Some(value) => ContentKind::parse(value).ok_or_else(|| StateError::InvalidAttribute {
                    element: "module-output",
                    attribute: "content",
                    value: value.clone(),
                })?,
                None => ContentKind::Production,
            };
            Ok(PackagingElement::module_output(s.required("module-output", "module_name")?, content))
        },
        ElementType::Library => |s| {
            let level = match s.attributes.get("level") {
                Some(value) => LibraryLevel::parse(value).ok_or_else(|| StateError::InvalidAttribute {
                    element: "library",
                    attribute: "level",
                    value: value.clone(),
                })?,
                None => LibraryLevel::Project,
            };
            Ok(PackagingElement::library(level, s.required("library", "name")?, s.optional("module")))
        },
    }
}

/// Persisted attributes of an element
pub fn element_attributes(element: &PackagingElement) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut put = |key: &str, value: &str| {
        attributes.insert(key.to_string(), value.to_string());
    };
    match element {
        PackagingElement::ArtifactRoot => {}
        PackagingElement::Directory { name } | PackagingElement::Archive { name } => put("name", name),
        PackagingElement::FileCopy { path, output_name } => {
            put("path", path);
            if let Some(output_name) = output_name {
                put("output_name", output_name);
            }
        }
        PackagingElement::DirectoryCopy { path } => put("path", path),
        PackagingElement::ExtractedDirectory {
            archive_path,
            path_in_archive,
        } => {
            put("archive_path", archive_path);
            put("path_in_archive", path_in_archive);
        }
        PackagingElement::Artifact { artifact_name } => put("artifact_name", artifact_name),
        PackagingElement::ModuleOutput {
            module_name,
            content,
        } => {
            put("module_name", module_name);
            put("content", content.as_str());
        }
        PackagingElement::Library(library) => {
            put("name", &library.name);
            put("level", library.level.as_str());
            if let Some(module) = &library.module {
                put("module", module);
            }
        }
    }
    attributes
}

/// Serializes the subtree of `id`
pub fn save_element(tree: &PackagingTree, id: ElementId) -> Option<ElementState> {
    let element = tree.get(id)?;
    Some(ElementState {
        type_id: element.element_type().id().to_string(),
        attributes: element_attributes(element),
        children: tree
            .children(id)
            .iter()
            .filter_map(|child| save_element(tree, *child))
            .collect(),
    })
}

/// Serializes a whole tree
pub fn save_tree(tree: &PackagingTree) -> ElementState {
    save_element(tree, tree.root()).unwrap_or_else(|| ElementState::new(ElementType::Root.id()))
}

/// Rebuilds a tree from its persisted root
pub fn load_tree(state: &ElementState, registry: &ElementTypeRegistry) -> Result<PackagingTree, StateError> {
    let root = registry.create(state)?;
    let mut tree = PackagingTree::with_root(root)
        .map_err(|_| StateError::RootNotComposite(state.type_id.clone()))?;
    let root_id = tree.root();
    for child in &state.children {
        load_children(&mut tree, root_id, child, registry)?;
    }
    Ok(tree)
}

fn load_children(
    tree: &mut PackagingTree,
    parent: ElementId,
    state: &ElementState,
    registry: &ElementTypeRegistry,
) -> Result<(), StateError> {
    let element = registry.create(state)?;
    if element == PackagingElement::ArtifactRoot {
        return Err(StateError::NestedRoot);
    }
    if !element.is_composite() && !state.children.is_empty() {
        return Err(StateError::UnexpectedChildren(state.type_id.clone()));
    }
    let id = tree
        .add_child(parent, element)
        .map_err(|_| StateError::UnexpectedChildren(state.type_id.clone()))?;
    for child in &state.children {
        load_children(tree, id, child, registry)?;
    }
    Ok(())
}

/// Loads an artifact, checking its type against `artifact_types`
pub fn load_artifact(
    state: &ArtifactState,
    element_types: &ElementTypeRegistry,
    artifact_types: &ArtifactTypeRegistry,
) -> Result<ArtifactData, StateError> {
    let artifact_type = artifact_types
        .find_by_str(&state.artifact_type)
        .ok_or_else(|| StateError::UnknownArtifactType(state.artifact_type.clone()))?;
    let root = load_tree(&state.root, element_types)?;

    let mut data = ArtifactData::new(state.name.clone(), artifact_type.id.clone(), root);
    data.set_build_on_make(state.build_on_make);
    data.set_output_path(state.output_path.clone());
    for (key, value) in &state.properties {
        data.set_property(key.clone(), value.clone());
    }
    Ok(data)
}

/// Loads an artifact, or an invalid placeholder keeping the raw state
pub fn load_artifact_or_invalid(
    state: ArtifactState,
    element_types: &ElementTypeRegistry,
    artifact_types: &ArtifactTypeRegistry,
) -> ArtifactData {
    match load_artifact(&state, element_types, artifact_types) {
        Ok(data) => data,
        Err(err) => ArtifactData::invalid(state, err.to_string()),
    }
}

/// Persisted form of an artifact; invalid artifacts return their raw state
pub fn save_artifact(data: &ArtifactData) -> ArtifactState {
    if let Some(invalid) = data.invalid_info() {
        return invalid.state.clone();
    }
    ArtifactState {
        name: data.name().to_string(),
        artifact_type: data.artifact_type().as_str().to_string(),
        build_on_make: data.build_on_make(),
        output_path: data.output_path().map(str::to_string),
        root: save_tree(data.root_tree()),
        properties: data.properties().clone(),
    }
}

/// Type id persisted for an artifact
pub fn persisted_type(data: &ArtifactData) -> ArtifactTypeId {
    match data.invalid_info() {
        Some(invalid) => ArtifactTypeId::new(invalid.state.artifact_type.clone()),
        None => data.artifact_type().clone(),
    }
}
