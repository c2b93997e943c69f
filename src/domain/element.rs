//! Packaging elements
//!
//! An artifact's output layout is a tree of packaging elements. Trees are
//! stored as arenas: every element lives in a [`PackagingTree`] and is
//! addressed by an [`ElementId`]. The identity of an element across the whole
//! process is the pair of its tree's [`TreeId`] and its id ([`ElementKey`]),
//! which is what traversals use for their visited sets.
//!
//! Element variants fall into three categories:
//!
//! | Category | Variants | Behavior |
//! |----------|----------|----------|
//! | Leaf | file copy, directory copy, extracted directory | Produce output directly |
//! | Composite | artifact root, directory, archive | Own an ordered list of children |
//! | Complex | artifact, module output, library | Stand for other elements via substitution |

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ElementError {
    #[error("Element {0} does not exist in this tree")]
    UnknownElement(ElementId),

    #[error("Element {0} is not a composite element")]
    NotComposite(ElementId),

    #[error("The artifact root can only be the top of a tree")]
    NestedRoot,

    #[error("The root element of a tree cannot be removed or replaced")]
    RootImmutable,

    #[error("Root element must be a composite, got {0}")]
    RootNotComposite(ElementType),

    #[error("Cannot replace a {0} element with a {1} element")]
    CategoryMismatch(ElementType, ElementType),
}

/// Broad classification of element types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementCategory {
    /// Produces output directly
    Leaf,
    /// Owns an ordered list of children
    Composite,
    /// Resolves to other elements through substitution
    Complex,
}

/// Stable element type, identified on disk by its type id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementType {
    Root,
    Directory,
    Archive,
    FileCopy,
    DirCopy,
    ExtractedDir,
    Artifact,
    ModuleOutput,
    Library,
}

impl ElementType {
    /// All built-in element types
    pub const ALL: [ElementType; 9] = [
        ElementType::Root,
        ElementType::Directory,
        ElementType::Archive,
        ElementType::FileCopy,
        ElementType::DirCopy,
        ElementType::ExtractedDir,
        ElementType::Artifact,
        ElementType::ModuleOutput,
        ElementType::Library,
    ];

    /// Returns the persisted type id
    pub fn id(&self) -> &'static str {
        match self {
            ElementType::Root => "root",
            ElementType::Directory => "directory",
            ElementType::Archive => "archive",
            ElementType::FileCopy => "file-copy",
            ElementType::DirCopy => "dir-copy",
            ElementType::ExtractedDir => "extracted-dir",
            ElementType::Artifact => "artifact",
            ElementType::ModuleOutput => "module-output",
            ElementType::Library => "library",
        }
    }

    /// Looks up a built-in type by its persisted id
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    pub fn category(&self) -> ElementCategory {
        match self {
            ElementType::Root | ElementType::Directory | ElementType::Archive => {
                ElementCategory::Composite
            }
            ElementType::Artifact | ElementType::ModuleOutput | ElementType::Library => {
                ElementCategory::Complex
            }
            ElementType::FileCopy | ElementType::DirCopy | ElementType::ExtractedDir => {
                ElementCategory::Leaf
            }
        }
    }

    /// Returns a human-readable name for listings
    pub fn presentable_name(&self) -> &'static str {
        match self {
            ElementType::Root => "Artifact root",
            ElementType::Directory => "Directory",
            ElementType::Archive => "Archive",
            ElementType::FileCopy => "File",
            ElementType::DirCopy => "Directory content",
            ElementType::ExtractedDir => "Extracted directory",
            ElementType::Artifact => "Artifact",
            ElementType::ModuleOutput => "Module output",
            ElementType::Library => "Library files",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Which content folders of a module an output element covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Production,
    Test,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Production => "production",
            ContentKind::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "production" => Some(ContentKind::Production),
            "test" => Some(ContentKind::Test),
            _ => None,
        }
    }
}

/// Where a library is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryLevel {
    #[default]
    Project,
    Module,
    Global,
}

impl LibraryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryLevel::Project => "project",
            LibraryLevel::Module => "module",
            LibraryLevel::Global => "global",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(LibraryLevel::Project),
            "module" => Some(LibraryLevel::Module),
            "global" => Some(LibraryLevel::Global),
            _ => None,
        }
    }
}

/// Reference to a library by level, name and (for module libraries) owner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryRef {
    pub level: LibraryLevel,
    pub name: String,
    pub module: Option<String>,
}

/// The data of a single packaging element
///
/// Children of composite elements are kept by the owning [`PackagingTree`],
/// so two elements compare equal when they describe the same output
/// (same type and same identifying fields), regardless of their children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackagingElement {
    ArtifactRoot,
    Directory { name: String },
    Archive { name: String },
    FileCopy { path: String, output_name: Option<String> },
    DirectoryCopy { path: String },
    ExtractedDirectory { archive_path: String, path_in_archive: String },
    Artifact { artifact_name: String },
    ModuleOutput { module_name: String, content: ContentKind },
    Library(LibraryRef),
}

impl PackagingElement {
    pub fn directory(name: impl Into<String>) -> Self {
        Self::Directory { name: name.into() }
    }

    pub fn archive(name: impl Into<String>) -> Self {
        Self::Archive { name: name.into() }
    }

    pub fn file_copy(path: impl Into<String>) -> Self {
        Self::FileCopy {
            path: path.into(),
            output_name: None,
        }
    }

    pub fn renamed_file_copy(path: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self::FileCopy {
            path: path.into(),
            output_name: Some(output_name.into()),
        }
    }

    pub fn directory_copy(path: impl Into<String>) -> Self {
        Self::DirectoryCopy { path: path.into() }
    }

    pub fn extracted_directory(
        archive_path: impl Into<String>,
        path_in_archive: impl Into<String>,
    ) -> Self {
        Self::ExtractedDirectory {
            archive_path: archive_path.into(),
            path_in_archive: path_in_archive.into(),
        }
    }

    pub fn artifact(artifact_name: impl Into<String>) -> Self {
        Self::Artifact {
            artifact_name: artifact_name.into(),
        }
    }

    pub fn module_output(module_name: impl Into<String>, content: ContentKind) -> Self {
        Self::ModuleOutput {
            module_name: module_name.into(),
            content,
        }
    }

    pub fn library(level: LibraryLevel, name: impl Into<String>, module: Option<String>) -> Self {
        Self::Library(LibraryRef {
            level,
            name: name.into(),
            module,
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Self::ArtifactRoot => ElementType::Root,
            Self::Directory { .. } => ElementType::Directory,
            Self::Archive { .. } => ElementType::Archive,
            Self::FileCopy { .. } => ElementType::FileCopy,
            Self::DirectoryCopy { .. } => ElementType::DirCopy,
            Self::ExtractedDirectory { .. } => ElementType::ExtractedDir,
            Self::Artifact { .. } => ElementType::Artifact,
            Self::ModuleOutput { .. } => ElementType::ModuleOutput,
            Self::Library(_) => ElementType::Library,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.element_type().category() == ElementCategory::Composite
    }

    pub fn is_complex(&self) -> bool {
        self.element_type().category() == ElementCategory::Complex
    }

    /// Returns the output name of a composite element (empty for the artifact root)
    pub fn composite_name(&self) -> Option<&str> {
        match self {
            Self::ArtifactRoot => Some(""),
            Self::Directory { name } | Self::Archive { name } => Some(name),
            _ => None,
        }
    }

    /// Returns the file name a file copy produces
    pub fn output_file_name(&self) -> Option<&str> {
        match self {
            Self::FileCopy { path, output_name } => Some(
                output_name
                    .as_deref()
                    .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path)),
            ),
            _ => None,
        }
    }

    /// Returns the source path of a file or directory copy
    pub fn source_path(&self) -> Option<&str> {
        match self {
            Self::FileCopy { path, .. } | Self::DirectoryCopy { path } => Some(path),
            Self::ExtractedDirectory { archive_path, .. } => Some(archive_path),
            _ => None,
        }
    }

    /// Returns the referenced artifact name of an embedded artifact element
    pub fn artifact_name(&self) -> Option<&str> {
        match self {
            Self::Artifact { artifact_name } => Some(artifact_name),
            _ => None,
        }
    }
}

impl fmt::Display for PackagingElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArtifactRoot => write!(f, "<root>"),
            Self::Directory { name } => write!(f, "{}/", name),
            Self::Archive { name } => write!(f, "{}", name),
            Self::FileCopy { path, output_name } => match output_name {
                Some(name) => write!(f, "file '{}' as '{}'", path, name),
                None => write!(f, "file '{}'", path),
            },
            Self::DirectoryCopy { path } => write!(f, "directory content '{}'", path),
            Self::ExtractedDirectory {
                archive_path,
                path_in_archive,
            } => write!(f, "extracted '{}!/{}'", archive_path, path_in_archive),
            Self::Artifact { artifact_name } => write!(f, "artifact '{}'", artifact_name),
            Self::ModuleOutput {
                module_name,
                content,
            } => write!(f, "module '{}' {} output", module_name, content.as_str()),
            Self::Library(lib) => match &lib.module {
                Some(module) => write!(f, "library '{}' ({}, {})", lib.name, lib.level.as_str(), module),
                None => write!(f, "library '{}' ({})", lib.name, lib.level.as_str()),
            },
        }
    }
}

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a tree instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    fn fresh() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Index of an element inside its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u32);

impl ElementId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of an element across all trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementKey {
    pub tree: TreeId,
    pub element: ElementId,
}

#[derive(Debug)]
struct Node {
    element: PackagingElement,
    children: Vec<ElementId>,
    parent: Option<ElementId>,
}

/// An arena-backed tree of packaging elements
///
/// Cloning a tree produces a structurally equal tree with a fresh [`TreeId`],
/// so clones never share element identities with their source.
#[derive(Debug)]
pub struct PackagingTree {
    id: TreeId,
    nodes: Vec<Node>,
    root: ElementId,
}

impl PackagingTree {
    /// Creates a tree whose root is an artifact root
    pub fn with_artifact_root() -> Self {
        Self::new_unchecked(PackagingElement::ArtifactRoot)
    }

    /// Creates a tree with the given composite root
    pub fn with_root(root: PackagingElement) -> Result<Self, ElementError> {
        if !root.is_composite() {
            return Err(ElementError::RootNotComposite(root.element_type()));
        }
        Ok(Self::new_unchecked(root))
    }

    fn new_unchecked(root: PackagingElement) -> Self {
        Self {
            id: TreeId::fresh(),
            nodes: vec![Node {
                element: root,
                children: Vec::new(),
                parent: None,
            }],
            root: ElementId(0),
        }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn root_element(&self) -> &PackagingElement {
        &self.nodes[self.root.index()].element
    }

    /// Returns the process-wide identity of an element of this tree
    pub fn key(&self, id: ElementId) -> ElementKey {
        ElementKey {
            tree: self.id,
            element: id,
        }
    }

    fn node(&self, id: ElementId) -> Result<&Node, ElementError> {
        self.nodes
            .get(id.index())
            .ok_or(ElementError::UnknownElement(id))
    }

    fn node_mut(&mut self, id: ElementId) -> Result<&mut Node, ElementError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(ElementError::UnknownElement(id))
    }

    pub fn get(&self, id: ElementId) -> Option<&PackagingElement> {
        self.nodes.get(id.index()).map(|n| &n.element)
    }

    /// Returns the children of a composite (empty for other elements)
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.nodes
            .get(id.index())
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(id.index()).and_then(|n| n.parent)
    }

    /// Returns true if the element is reachable from the root
    pub fn is_attached(&self, id: ElementId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Appends a new child to a composite element
    pub fn add_child(
        &mut self,
        parent: ElementId,
        element: PackagingElement,
    ) -> Result<ElementId, ElementError> {
        if element == PackagingElement::ArtifactRoot {
            return Err(ElementError::NestedRoot);
        }
        if !self.node(parent)?.element.is_composite() {
            return Err(ElementError::NotComposite(parent));
        }

        let id = ElementId(self.nodes.len() as u32);
        self.nodes.push(Node {
            element,
            children: Vec::new(),
            parent: Some(parent),
        });
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Returns an existing child equal to `element`, or adds it
    pub fn add_or_find_child(
        &mut self,
        parent: ElementId,
        element: PackagingElement,
    ) -> Result<ElementId, ElementError> {
        if let Some(existing) = self.find_equal_child(parent, &element) {
            return Ok(existing);
        }
        self.add_child(parent, element)
    }

    fn find_equal_child(&self, parent: ElementId, element: &PackagingElement) -> Option<ElementId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|child| self.get(*child) == Some(element))
    }

    /// Finds a composite child by its output name
    pub fn find_composite_child(&self, parent: ElementId, name: &str) -> Option<ElementId> {
        self.children(parent).iter().copied().find(|child| {
            self.get(*child)
                .filter(|e| e.element_type() != ElementType::Root)
                .and_then(PackagingElement::composite_name)
                == Some(name)
        })
    }

    /// Returns the composite at `relative_path` below `parent`, creating
    /// missing segments. Segments ending in `.zip` or `.jar` become archives.
    pub fn get_or_create_directory(
        &mut self,
        parent: ElementId,
        relative_path: &str,
    ) -> Result<ElementId, ElementError> {
        let mut current = parent;
        for segment in relative_path.split('/').filter(|s| !s.is_empty()) {
            current = match self.find_composite_child(current, segment) {
                Some(existing) => existing,
                None => {
                    let element = if segment.ends_with(".zip") || segment.ends_with(".jar") {
                        PackagingElement::archive(segment)
                    } else {
                        PackagingElement::directory(segment)
                    };
                    self.add_child(current, element)?
                }
            };
        }
        Ok(current)
    }

    /// Elements of this tree at `relative_path` below `parent`. Intermediate
    /// segments match composite names; the last one also matches file copy
    /// output names.
    pub fn find_at_path(&self, parent: ElementId, relative_path: &str) -> Vec<ElementId> {
        let segments: Vec<&str> = relative_path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, dirs)) = segments.split_last() else {
            return Vec::new();
        };

        let mut parents = vec![parent];
        for segment in dirs {
            parents = parents
                .iter()
                .flat_map(|p| self.children(*p).iter().copied())
                .filter(|child| {
                    self.get(*child)
                        .filter(|e| e.is_composite())
                        .and_then(PackagingElement::composite_name)
                        == Some(*segment)
                })
                .collect();
        }

        parents
            .iter()
            .flat_map(|p| self.children(*p).iter().copied())
            .filter(|child| match self.get(*child) {
                Some(e) if e.is_composite() => e.composite_name() == Some(*last),
                Some(e) => e.output_file_name() == Some(*last),
                None => false,
            })
            .collect()
    }

    /// Copies `source_id` of `source` (with all descendants) under `parent`.
    ///
    /// Equal elements already present under `parent` are reused and, for
    /// composites, the copied children are merged into them.
    pub fn add_or_find_copy(
        &mut self,
        parent: ElementId,
        source: &PackagingTree,
        source_id: ElementId,
    ) -> Result<ElementId, ElementError> {
        let element = source.node(source_id)?.element.clone();
        let target = self.add_or_find_child(parent, element)?;
        for child in source.children(source_id) {
            self.add_or_find_copy(target, source, *child)?;
        }
        Ok(target)
    }

    /// Copies the children of another tree's root into this tree's root
    pub fn copy_children_from(&mut self, source: &PackagingTree) -> Result<(), ElementError> {
        let root = self.root;
        for child in source.children(source.root) {
            self.add_or_find_copy(root, source, *child)?;
        }
        Ok(())
    }

    /// Detaches an element (and its subtree) from its parent
    pub fn remove(&mut self, id: ElementId) -> Result<bool, ElementError> {
        if id == self.root {
            return Err(ElementError::RootImmutable);
        }
        let parent = match self.node_mut(id)?.parent.take() {
            Some(parent) => parent,
            None => return Ok(false),
        };
        let siblings = &mut self.node_mut(parent)?.children;
        let before = siblings.len();
        siblings.retain(|c| *c != id);
        Ok(siblings.len() != before)
    }

    /// Replaces the data of an element, keeping its place and children
    pub fn replace(
        &mut self,
        id: ElementId,
        element: PackagingElement,
    ) -> Result<(), ElementError> {
        if id == self.root {
            return Err(ElementError::RootImmutable);
        }
        if element == PackagingElement::ArtifactRoot {
            return Err(ElementError::NestedRoot);
        }
        let node = self.node_mut(id)?;
        let old_type = node.element.element_type();
        let new_type = element.element_type();
        if old_type.category() != new_type.category()
            && (old_type.category() == ElementCategory::Composite
                || new_type.category() == ElementCategory::Composite)
        {
            return Err(ElementError::CategoryMismatch(old_type, new_type));
        }
        node.element = element;
        Ok(())
    }

    /// Merges equal siblings, recursively, keeping the first occurrence.
    ///
    /// Children of a dropped composite are merged into the surviving one.
    pub fn remove_duplicates(&mut self, parent: ElementId) -> Result<(), ElementError> {
        let children = self.children(parent).to_vec();
        let mut kept: Vec<ElementId> = Vec::new();

        for child in children {
            let element = self.node(child)?.element.clone();
            let survivor = kept
                .iter()
                .copied()
                .find(|k| self.get(*k) == Some(&element));

            match survivor {
                Some(survivor) => {
                    let moved = self.children(child).to_vec();
                    for grandchild in moved {
                        self.node_mut(grandchild)?.parent = Some(survivor);
                        self.node_mut(survivor)?.children.push(grandchild);
                    }
                    self.node_mut(child)?.children.clear();
                    self.remove(child)?;
                }
                None => kept.push(child),
            }
        }

        for child in kept {
            if self.node(child)?.element.is_composite() {
                self.remove_duplicates(child)?;
            }
        }
        Ok(())
    }

    /// Removes leaves matching `condition` and composites left empty
    pub fn remove_children_recursively(
        &mut self,
        parent: ElementId,
        condition: &mut dyn FnMut(&PackagingElement) -> bool,
    ) -> Result<(), ElementError> {
        let mut to_remove = Vec::new();
        for child in self.children(parent).to_vec() {
            let element = self.node(child)?.element.clone();
            if element.is_composite() {
                self.remove_children_recursively(child, condition)?;
                if self.children(child).is_empty() {
                    to_remove.push(child);
                }
            } else if condition(&element) {
                to_remove.push(child);
            }
        }
        for child in to_remove {
            self.remove(child)?;
        }
        Ok(())
    }

    /// Returns attached elements in pre-order, starting at `from`
    pub fn descendants(&self, from: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            result.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        result
    }

    /// Number of elements reachable from the root
    pub fn len(&self) -> usize {
        self.descendants(self.root).len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    fn subtree_eq(&self, a: ElementId, other: &PackagingTree, b: ElementId) -> bool {
        let (Some(left), Some(right)) = (self.get(a), other.get(b)) else {
            return false;
        };
        let left_children = self.children(a);
        let right_children = other.children(b);
        left == right
            && left_children.len() == right_children.len()
            && left_children
                .iter()
                .zip(right_children)
                .all(|(l, r)| self.subtree_eq(*l, other, *r))
    }

    /// Copies only attached nodes into a fresh arena
    fn compacted(&self) -> Self {
        let mut tree = Self::new_unchecked(self.root_element().clone());
        let root = tree.root;
        let mut seen = HashSet::new();
        self.copy_into(self.root, &mut tree, root, &mut seen);
        tree
    }

    fn copy_into(
        &self,
        from: ElementId,
        target: &mut PackagingTree,
        target_parent: ElementId,
        seen: &mut HashSet<ElementId>,
    ) {
        for child in self.children(from) {
            if !seen.insert(*child) {
                continue;
            }
            let Some(element) = self.get(*child) else {
                continue;
            };
            let id = ElementId(target.nodes.len() as u32);
            target.nodes.push(Node {
                element: element.clone(),
                children: Vec::new(),
                parent: Some(target_parent),
            });
            target.nodes[target_parent.index()].children.push(id);
            self.copy_into(*child, target, id, seen);
        }
    }
}

impl Clone for PackagingTree {
    fn clone(&self) -> Self {
        self.compacted()
    }
}

impl PartialEq for PackagingTree {
    fn eq(&self, other: &Self) -> bool {
        self.subtree_eq(self.root, other, other.root)
    }
}

/// A shared, identity-carrying reference to an element of a tree
#[derive(Clone)]
pub struct ElementRef {
    tree: Arc<PackagingTree>,
    id: ElementId,
}

impl ElementRef {
    /// Creates a reference if `id` exists in `tree`
    pub fn new(tree: Arc<PackagingTree>, id: ElementId) -> Option<Self> {
        tree.get(id)?;
        Some(Self { tree, id })
    }

    pub fn root_of(tree: &Arc<PackagingTree>) -> Self {
        Self {
            tree: Arc::clone(tree),
            id: tree.root(),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn tree(&self) -> &Arc<PackagingTree> {
        &self.tree
    }

    pub fn key(&self) -> ElementKey {
        self.tree.key(self.id)
    }

    pub fn element(&self) -> &PackagingElement {
        &self.tree.nodes[self.id.index()].element
    }

    pub fn element_type(&self) -> ElementType {
        self.element().element_type()
    }

    pub fn children(&self) -> Vec<ElementRef> {
        self.tree
            .children(self.id)
            .iter()
            .map(|child| Self {
                tree: Arc::clone(&self.tree),
                id: *child,
            })
            .collect()
    }
}

impl PartialEq for ElementRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ElementRef {}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:?}{}]", self.element(), self.tree.id, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (PackagingTree, ElementId) {
        let mut tree = PackagingTree::with_artifact_root();
        let root = tree.root();
        let lib = tree.add_child(root, PackagingElement::directory("lib")).unwrap();
        tree.add_child(lib, PackagingElement::file_copy("/libs/a.jar")).unwrap();
        tree.add_child(root, PackagingElement::artifact("Other")).unwrap();
        (tree, lib)
    }

    #[test]
    fn type_ids_round_trip() {
        for t in ElementType::ALL {
            assert_eq!(ElementType::from_id(t.id()), Some(t));
        }
        assert_eq!(ElementType::from_id("war"), None);
    }

    #[test]
    fn categories() {
        assert_eq!(ElementType::Archive.category(), ElementCategory::Composite);
        assert_eq!(ElementType::Library.category(), ElementCategory::Complex);
        assert_eq!(ElementType::ExtractedDir.category(), ElementCategory::Leaf);
    }

    #[test]
    fn root_cannot_be_nested() {
        let mut tree = PackagingTree::with_artifact_root();
        let root = tree.root();
        assert_eq!(
            tree.add_child(root, PackagingElement::ArtifactRoot),
            Err(ElementError::NestedRoot)
        );
    }

    #[test]
    fn root_must_be_composite() {
        let result = PackagingTree::with_root(PackagingElement::file_copy("a.txt"));
        assert!(matches!(result, Err(ElementError::RootNotComposite(ElementType::FileCopy))));
    }

    #[test]
    fn leaves_cannot_have_children() {
        let mut tree = PackagingTree::with_artifact_root();
        let root = tree.root();
        let file = tree.add_child(root, PackagingElement::file_copy("a.txt")).unwrap();
        assert_eq!(
            tree.add_child(file, PackagingElement::directory("x")),
            Err(ElementError::NotComposite(file))
        );
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut tree = PackagingTree::with_artifact_root();
        let root = tree.root();
        let b = tree.add_child(root, PackagingElement::directory("b")).unwrap();
        let a = tree.add_child(root, PackagingElement::directory("a")).unwrap();
        assert_eq!(tree.children(root), &[b, a]);
    }

    #[test]
    fn output_file_name_defaults_to_last_segment() {
        assert_eq!(
            PackagingElement::file_copy("/src/conf/app.properties").output_file_name(),
            Some("app.properties")
        );
        assert_eq!(
            PackagingElement::renamed_file_copy("/src/a.txt", "b.txt").output_file_name(),
            Some("b.txt")
        );
    }

    #[test]
    fn add_or_find_reuses_equal_child() {
        let (mut tree, lib) = sample_tree();
        let root = tree.root();
        let again = tree
            .add_or_find_child(root, PackagingElement::directory("lib"))
            .unwrap();
        assert_eq!(again, lib);
        assert_eq!(tree.children(root).len(), 2);
    }

    #[test]
    fn copy_merges_into_existing_composites() {
        let (source, _) = sample_tree();
        let mut target = PackagingTree::with_artifact_root();
        let root = target.root();
        let lib = target.add_child(root, PackagingElement::directory("lib")).unwrap();
        target.add_child(lib, PackagingElement::file_copy("/libs/b.jar")).unwrap();

        target.copy_children_from(&source).unwrap();

        assert_eq!(target.children(root).len(), 2);
        assert_eq!(target.children(lib).len(), 2);
    }

    #[test]
    fn clone_is_structurally_equal_with_new_identity() {
        let (tree, _) = sample_tree();
        let copy = tree.clone();
        assert_eq!(tree, copy);
        assert_ne!(tree.id(), copy.id());
    }

    #[test]
    fn clone_drops_detached_nodes() {
        let (mut tree, lib) = sample_tree();
        tree.remove(lib).unwrap();
        let copy = tree.clone();
        assert_eq!(copy.len(), 2);
        assert_eq!(tree, copy);
    }

    #[test]
    fn structural_equality_respects_order() {
        let mut a = PackagingTree::with_artifact_root();
        let mut b = PackagingTree::with_artifact_root();
        let (ra, rb) = (a.root(), b.root());
        a.add_child(ra, PackagingElement::directory("x")).unwrap();
        a.add_child(ra, PackagingElement::directory("y")).unwrap();
        b.add_child(rb, PackagingElement::directory("y")).unwrap();
        b.add_child(rb, PackagingElement::directory("x")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn remove_detaches_subtree() {
        let (mut tree, lib) = sample_tree();
        assert!(tree.remove(lib).unwrap());
        assert!(!tree.is_attached(lib));
        assert!(!tree.remove(lib).unwrap());
        assert_eq!(tree.remove(tree.root()), Err(ElementError::RootImmutable));
    }

    #[test]
    fn remove_duplicates_merges_composites() {
        let mut tree = PackagingTree::with_artifact_root();
        let root = tree.root();
        let first = tree.add_child(root, PackagingElement::directory("lib")).unwrap();
        tree.add_child(first, PackagingElement::file_copy("a.jar")).unwrap();
        let second = tree.add_child(root, PackagingElement::directory("lib")).unwrap();
        tree.add_child(second, PackagingElement::file_copy("b.jar")).unwrap();
        tree.add_child(second, PackagingElement::file_copy("a.jar")).unwrap();
        tree.add_child(root, PackagingElement::file_copy("x.txt")).unwrap();
        tree.add_child(root, PackagingElement::file_copy("x.txt")).unwrap();

        tree.remove_duplicates(root).unwrap();

        assert_eq!(tree.children(root).len(), 2);
        let names: Vec<_> = tree
            .children(first)
            .iter()
            .filter_map(|c| tree.get(*c).and_then(|e| e.output_file_name()))
            .collect();
        assert_eq!(names, vec!["a.jar", "b.jar"]);
    }

    #[test]
    fn remove_children_recursively_prunes_empty_dirs() {
        let (mut tree, lib) = sample_tree();
        let root = tree.root();
        tree.remove_children_recursively(root, &mut |e| {
            e.element_type() == ElementType::FileCopy
        })
        .unwrap();
        assert!(!tree.is_attached(lib));
        assert_eq!(tree.children(root).len(), 1);
    }

    #[test]
    fn get_or_create_directory_builds_path() {
        let mut tree = PackagingTree::with_artifact_root();
        let root = tree.root();
        let inner = tree.get_or_create_directory(root, "WEB-INF/lib/app.jar").unwrap();
        assert_eq!(tree.get(inner), Some(&PackagingElement::archive("app.jar")));
        let again = tree.get_or_create_directory(root, "/WEB-INF/lib/app.jar/").unwrap();
        assert_eq!(inner, again);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn find_at_path_matches_directories_and_files() {
        let (mut tree, lib) = sample_tree();
        let root = tree.root();
        tree.add_child(lib, PackagingElement::renamed_file_copy("/libs/b.jar", "b-1.0.jar"))
            .unwrap();

        assert_eq!(tree.find_at_path(root, "lib"), vec![lib]);
        assert_eq!(tree.find_at_path(root, "/lib/a.jar").len(), 1);
        assert_eq!(tree.find_at_path(root, "lib/b-1.0.jar").len(), 1);
        assert!(tree.find_at_path(root, "lib/b.jar").is_empty());
        assert!(tree.find_at_path(root, "").is_empty());
    }

    #[test]
    fn replace_checks_category() {
        let (mut tree, lib) = sample_tree();
        assert!(tree.replace(lib, PackagingElement::archive("lib.zip")).is_ok());
        assert_eq!(
            tree.replace(lib, PackagingElement::file_copy("x")),
            Err(ElementError::CategoryMismatch(ElementType::Archive, ElementType::FileCopy))
        );
    }

    #[test]
    fn element_refs_compare_by_identity() {
        let (tree, _) = sample_tree();
        let tree = Arc::new(tree);
        let copy = Arc::new((*tree).clone());
        let a = ElementRef::root_of(&tree);
        let b = ElementRef::root_of(&copy);
        assert_ne!(a, b);
        assert_eq!(a, ElementRef::root_of(&tree));
        assert_eq!(a.children().len(), 2);
    }
}
