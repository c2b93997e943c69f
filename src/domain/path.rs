//! Element paths
//!
//! An [`ElementPath`] records the chain of composite and complex elements a
//! traversal passed through to reach the element it is currently visiting.
//! Paths are persistent linked lists: appending shares the parent path, so
//! every callback can hold on to its path without copying.

use std::fmt;
use std::sync::Arc;

use super::artifact::Artifact;
use super::context::ResolvingContext;
use super::element::{ElementCategory, ElementRef};

struct PathNode {
    element: ElementRef,
    parent: ElementPath,
}

/// Immutable chain of enclosing elements, outermost first when listed
#[derive(Clone, Default)]
pub struct ElementPath {
    head: Option<Arc<PathNode>>,
    len: usize,
}

impl ElementPath {
    /// The path of a traversal root
    pub const EMPTY: ElementPath = ElementPath { head: None, len: 0 };

    /// Extends the path with a composite element
    pub fn append_composite(&self, element: ElementRef) -> ElementPath {
        self.append(element)
    }

    /// Extends the path with a complex element that was substituted
    pub fn append_complex(&self, element: ElementRef) -> ElementPath {
        self.append(element)
    }

    fn append(&self, element: ElementRef) -> ElementPath {
        ElementPath {
            head: Some(Arc::new(PathNode {
                element,
                parent: self.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The innermost element of the path
    pub fn last_element(&self) -> Option<&ElementRef> {
        self.head.as_ref().map(|node| &node.element)
    }

    /// The path without its innermost element
    pub fn parent_path(&self) -> Option<&ElementPath> {
        self.head.as_ref().map(|node| &node.parent)
    }

    /// Iterates elements from innermost to outermost
    pub fn iter(&self) -> impl Iterator<Item = &ElementRef> {
        let mut current = self.head.as_deref();
        std::iter::from_fn(move || {
            let node = current?;
            current = node.parent.head.as_deref();
            Some(&node.element)
        })
    }

    /// Composite elements of the path, nearest first
    pub fn parents(&self) -> Vec<ElementRef> {
        self.iter()
            .filter(|e| e.element_type().category() == ElementCategory::Composite)
            .cloned()
            .collect()
    }

    /// Composite elements of the path, outermost first
    pub fn parents_from_root(&self) -> Vec<ElementRef> {
        let mut parents = self.parents();
        parents.reverse();
        parents
    }

    /// The nearest composite element, if any
    pub fn last_parent(&self) -> Option<ElementRef> {
        self.iter()
            .find(|e| e.element_type().category() == ElementCategory::Composite)
            .cloned()
    }

    /// All elements of the path, outermost first
    pub fn all_elements(&self) -> Vec<ElementRef> {
        let mut all: Vec<ElementRef> = self.iter().cloned().collect();
        all.reverse();
        all
    }

    /// Joins the names of composite elements, outermost first, with `/`
    pub fn path_string(&self) -> String {
        self.path_string_with("/")
    }

    pub fn path_string_with(&self, separator: &str) -> String {
        self.path_string_from(separator, None)
    }

    /// Like [`path_string_with`](Self::path_string_with) but only counts
    /// composites nested inside `ancestor`. Empty names (artifact roots) are
    /// skipped.
    pub fn path_string_from(&self, separator: &str, ancestor: Option<&ElementRef>) -> String {
        let mut names = Vec::new();
        for element in self.iter() {
            if Some(element) == ancestor {
                break;
            }
            if let Some(name) = element.element().composite_name() {
                if !name.is_empty() {
                    names.push(name);
                }
            }
        }
        names.reverse();
        names.join(separator)
    }

    /// Names of the embedded artifacts this path passed through, outermost first
    pub fn artifact_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .iter()
            .filter_map(|e| e.element().artifact_name().map(str::to_string))
            .collect();
        names.reverse();
        names
    }

    /// Resolves the nearest embedded artifact of the path
    pub fn find_last_artifact(&self, ctx: &dyn ResolvingContext) -> Option<Artifact> {
        self.iter()
            .find_map(|e| e.element().artifact_name())
            .and_then(|name| ctx.find_artifact(name))
    }
}

impl fmt::Debug for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .all_elements()
            .iter()
            .map(|e| e.element().to_string())
            .collect();
        write!(f, "[{}]", parts.join(" > "))
    }
}
