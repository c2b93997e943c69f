//! Tree processor
//!
//! Depth-first, pre-order traversal over packaging element trees with a
//! pluggable [`ElementProcessor`]. Every traversal keeps one visited set of
//! element identities for its whole run, so an element reachable through
//! several substitution chains is visited once and self-referencing
//! substitutions terminate.
//!
//! Two flavors are provided:
//!
//! - [`process_packaging_elements`] yields every element (composites, complex
//!   elements and their substitutes) filtered by type.
//! - [`process_elements_with_substitutions`] inlines complex elements: the
//!   processor only ever sees their resolved substitutes.

use std::collections::HashSet;

use tracing::trace;

use super::artifact::{Artifact, ArtifactTypeId};
use super::context::{resolve_substitution, ResolvingContext};
use super::element::{ElementKey, ElementRef, ElementType, PackagingElement};
use super::path::ElementPath;

/// Visitor of a traversal
pub trait ElementProcessor {
    /// Gate consulted before an element is processed or descended into
    fn should_process(&mut self, _element: &ElementRef) -> bool {
        true
    }

    /// Gate consulted before a complex element is expanded
    fn should_process_substitution(&mut self, _element: &ElementRef) -> bool {
        true
    }

    /// Handles one element; returning `false` stops the whole traversal
    fn process(&mut self, element: &ElementRef, path: &ElementPath) -> bool;
}

/// Processor built from a closure, with both gates open
pub struct FnProcessor<F>(F);

/// Wraps a closure as an [`ElementProcessor`]
pub fn from_fn<F>(f: F) -> FnProcessor<F>
where
    F: FnMut(&ElementRef, &ElementPath) -> bool,
{
    FnProcessor(f)
}

impl<F> ElementProcessor for FnProcessor<F>
where
    F: FnMut(&ElementRef, &ElementPath) -> bool,
{
    fn process(&mut self, element: &ElementRef, path: &ElementPath) -> bool {
        (self.0)(element, path)
    }
}

struct Walker<'a> {
    filter: Option<ElementType>,
    processor: &'a mut dyn ElementProcessor,
    ctx: &'a dyn ResolvingContext,
    expand_substitutions: bool,
    artifact_type: &'a ArtifactTypeId,
    visited: HashSet<ElementKey>,
}

impl Walker<'_> {
    fn walk_all(&mut self, elements: &[ElementRef], path: &ElementPath) -> bool {
        elements.iter().all(|element| self.walk(element, path))
    }

    fn walk(&mut self, element: &ElementRef, path: &ElementPath) -> bool {
        if !self.visited.insert(element.key()) {
            return true;
        }
        if !self.processor.should_process(element) {
            return true;
        }

        if self.filter.map_or(true, |t| t == element.element_type())
            && !self.processor.process(element, path)
        {
            return false;
        }

        let data = element.element();
        if data.is_composite() {
            let children = element.children();
            return self.walk_all(&children, &path.append_composite(element.clone()));
        }

        if data.is_complex()
            && self.expand_substitutions
            && self.processor.should_process_substitution(element)
        {
            if let Some(substitution) = resolve_substitution(element, self.ctx, self.artifact_type) {
                return self.walk_all(&substitution, &path.append_complex(element.clone()));
            }
            trace!(element = %data, "substitution not resolvable");
        }
        true
    }
}

/// Traverses the tree below `root`, calling the processor for elements of
/// type `filter` (or all elements when `None`).
///
/// Returns `false` if the processor stopped the traversal.
pub fn process_packaging_elements(
    root: &ElementRef,
    filter: Option<ElementType>,
    processor: &mut dyn ElementProcessor,
    ctx: &dyn ResolvingContext,
    expand_substitutions: bool,
    artifact_type: &ArtifactTypeId,
) -> bool {
    let mut walker = Walker {
        filter,
        processor,
        ctx,
        expand_substitutions,
        artifact_type,
        visited: HashSet::new(),
    };
    walker.walk(root, &ElementPath::EMPTY)
}

/// Traverses an artifact's tree using the artifact's own type for substitutions
pub fn process_artifact_elements(
    artifact: &Artifact,
    filter: Option<ElementType>,
    processor: &mut dyn ElementProcessor,
    ctx: &dyn ResolvingContext,
    expand_substitutions: bool,
) -> bool {
    process_packaging_elements(
        &artifact.root_ref(),
        filter,
        processor,
        ctx,
        expand_substitutions,
        artifact.artifact_type(),
    )
}

/// Visits every element of an artifact, expanding substitutions except for
/// embedded artifacts
pub fn process_recursively_skipping_included_artifacts(
    artifact: &Artifact,
    ctx: &dyn ResolvingContext,
    processor: &mut dyn FnMut(&ElementRef) -> bool,
) -> bool {
    struct SkipArtifacts<'a>(&'a mut dyn FnMut(&ElementRef) -> bool);

    impl ElementProcessor for SkipArtifacts<'_> {
        fn should_process_substitution(&mut self, element: &ElementRef) -> bool {
            element.element_type() != ElementType::Artifact
        }

        fn process(&mut self, element: &ElementRef, _path: &ElementPath) -> bool {
            (self.0)(element)
        }
    }

    process_artifact_elements(artifact, None, &mut SkipArtifacts(processor), ctx, true)
}

/// Visits file copies, then directory copies, then extracted directories
pub fn process_file_or_directory_copy_elements(
    artifact: &Artifact,
    processor: &mut dyn ElementProcessor,
    ctx: &dyn ResolvingContext,
    expand_substitutions: bool,
) -> bool {
    [ElementType::FileCopy, ElementType::DirCopy, ElementType::ExtractedDir]
        .into_iter()
        .all(|t| {
            process_artifact_elements(artifact, Some(t), &mut *processor, ctx, expand_substitutions)
        })
}

/// Processes `elements` and, in place of each complex element, its resolved
/// substitutes.
///
/// Complex elements are only handed to the processor when its
/// `should_process_substitution` gate refuses expansion. Unresolvable complex
/// elements contribute nothing. Composites are not descended into.
pub fn process_elements_with_substitutions(
    elements: &[ElementRef],
    ctx: &dyn ResolvingContext,
    artifact_type: &ArtifactTypeId,
    parent_path: &ElementPath,
    processor: &mut dyn ElementProcessor,
) -> bool {
    let mut visited = HashSet::new();
    inline_substitutions(elements, ctx, artifact_type, parent_path, processor, &mut visited)
}

fn inline_substitutions(
    elements: &[ElementRef],
    ctx: &dyn ResolvingContext,
    artifact_type: &ArtifactTypeId,
    parent_path: &ElementPath,
    processor: &mut dyn ElementProcessor,
    visited: &mut HashSet<ElementKey>,
) -> bool {
    for element in elements {
        if !visited.insert(element.key()) {
            continue;
        }

        if element.element().is_complex() && processor.should_process_substitution(element) {
            if let Some(substitution) = resolve_substitution(element, ctx, artifact_type) {
                let path = parent_path.append_complex(element.clone());
                if !inline_substitutions(&substitution, ctx, artifact_type, &path, processor, visited) {
                    return false;
                }
            }
        } else if !processor.process(element, parent_path) {
            return false;
        }
    }
    true
}

fn split_first_segment(relative_path: &str) -> (&str, &str) {
    relative_path.split_once('/').unwrap_or((relative_path, ""))
}

/// Processes the elements found at `relative_path` inside the composite
/// `parent`. Segments match composite names and file copy output names.
pub fn process_elements_by_relative_path(
    parent: &ElementRef,
    relative_path: &str,
    ctx: &dyn ResolvingContext,
    artifact_type: &ArtifactTypeId,
    parent_path: &ElementPath,
    processor: &mut dyn ElementProcessor,
) -> bool {
    let relative_path = relative_path.trim_start_matches('/');
    if relative_path.is_empty() {
        return true;
    }
    let (first, tail) = split_first_segment(relative_path);

    let mut matcher = from_fn(|element: &ElementRef, path: &ElementPath| {
        let data = element.element();
        let matches = if data.is_composite() {
            data.composite_name() == Some(first)
        } else {
            data.output_file_name() == Some(first)
        };
        if !matches {
            return true;
        }

        if tail.is_empty() {
            processor.process(element, path)
        } else if data.is_composite() {
            process_elements_by_relative_path(element, tail, ctx, artifact_type, path, &mut *processor)
        } else {
            true
        }
    });

    process_elements_with_substitutions(
        &parent.children(),
        ctx,
        artifact_type,
        &parent_path.append_composite(parent.clone()),
        &mut matcher,
    )
}

/// Collects the elements at `relative_path` inside `parent`
pub fn find_by_relative_path(
    parent: &ElementRef,
    relative_path: &str,
    ctx: &dyn ResolvingContext,
    artifact_type: &ArtifactTypeId,
) -> Vec<ElementRef> {
    let mut result = Vec::new();
    process_elements_by_relative_path(
        parent,
        relative_path,
        ctx,
        artifact_type,
        &ElementPath::EMPTY,
        &mut from_fn(|element: &ElementRef, _: &ElementPath| {
            result.push(element.clone());
            true
        }),
    );
    result
}

/// Processes the children (with substitutions inlined) of every directory
/// found at `relative_path` inside `parent`
pub fn process_directory_children(
    parent: &ElementRef,
    path_to_parent: &ElementPath,
    relative_path: &str,
    ctx: &dyn ResolvingContext,
    artifact_type: &ArtifactTypeId,
    processor: &mut dyn ElementProcessor,
) -> bool {
    process_elements_by_relative_path(
        parent,
        relative_path,
        ctx,
        artifact_type,
        path_to_parent,
        &mut from_fn(|element: &ElementRef, path: &ElementPath| {
            if !matches!(element.element(), PackagingElement::Directory { .. }) {
                return true;
            }
            process_elements_with_substitutions(
                &element.children(),
                ctx,
                artifact_type,
                &path.append_composite(element.clone()),
                &mut *processor,
            )
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::ArtifactData;
    use crate::domain::context::testing::FixedContext;
    use crate::domain::element::PackagingTree;

    fn data(name: &str, build: impl FnOnce(&mut PackagingTree)) -> ArtifactData {
        let mut tree = PackagingTree::with_artifact_root();
        build(&mut tree);
        ArtifactData::new(name, ArtifactTypeId::plain(), tree)
    }

    /// App: lib/ { a.jar, artifact Lib }, artifact Lib
    /// Lib: b.txt, artifact App
    fn cyclic_context() -> FixedContext {
        FixedContext::new(vec![
            data("App", |t| {
                let root = t.root();
                let lib = t.add_child(root, PackagingElement::directory("lib")).unwrap();
                t.add_child(lib, PackagingElement::file_copy("/libs/a.jar")).unwrap();
                t.add_child(lib, PackagingElement::artifact("Lib")).unwrap();
                t.add_child(root, PackagingElement::artifact("Lib")).unwrap();
            }),
            data("Lib", |t| {
                let root = t.root();
                t.add_child(root, PackagingElement::file_copy("/res/b.txt")).unwrap();
                t.add_child(root, PackagingElement::artifact("App")).unwrap();
            }),
        ])
    }

    fn visit_all(ctx: &FixedContext, name: &str, expand: bool) -> Vec<(String, String)> {
        let artifact = ctx.find_artifact(name).unwrap();
        let mut seen = Vec::new();
        process_artifact_elements(
            &artifact,
            None,
            &mut from_fn(|e: &ElementRef, p: &ElementPath| {
                seen.push((e.element().to_string(), p.path_string()));
                true
            }),
            ctx,
            expand,
        );
        seen
    }

    #[test]
    fn pre_order_without_expansion() {
        let ctx = cyclic_context();
        let seen = visit_all(&ctx, "App", false);
        let names: Vec<_> = seen.iter().map(|(e, _)| e.as_str()).collect();
        assert_eq!(
            names,
            vec!["<root>", "lib/", "file '/libs/a.jar'", "artifact 'Lib'", "artifact 'Lib'"]
        );
        assert_eq!(seen[2].1, "lib");
    }

    #[test]
    fn cyclic_substitution_terminates_and_visits_once() {
        let ctx = cyclic_context();
        let seen = visit_all(&ctx, "App", true);

        // App root children are reached again through Lib -> App but skipped.
        let b_txt = seen.iter().filter(|(e, _)| e == "file '/res/b.txt'").count();
        assert_eq!(b_txt, 1);
        let a_jar = seen.iter().filter(|(e, _)| e == "file '/libs/a.jar'").count();
        assert_eq!(a_jar, 1);
        assert!(seen.len() < 12);
    }

    #[test]
    fn type_filter_and_early_abort() {
        let ctx = cyclic_context();
        let artifact = ctx.find_artifact("App").unwrap();

        let mut count = 0;
        let completed = process_artifact_elements(
            &artifact,
            Some(ElementType::Artifact),
            &mut from_fn(|_: &ElementRef, _: &ElementPath| {
                count += 1;
                false
            }),
            &ctx,
            false,
        );
        assert!(!completed);
        assert_eq!(count, 1);
    }

    #[test]
    fn refused_elements_are_still_marked_visited() {
        struct SkipDirs(Vec<String>);

        impl ElementProcessor for SkipDirs {
            fn should_process(&mut self, element: &ElementRef) -> bool {
                element.element_type() != ElementType::Directory
            }

            fn process(&mut self, element: &ElementRef, _path: &ElementPath) -> bool {
                self.0.push(element.element().to_string());
                true
            }
        }

        let ctx = cyclic_context();
        let artifact = ctx.find_artifact("App").unwrap();
        let mut processor = SkipDirs(Vec::new());
        assert!(process_artifact_elements(&artifact, None, &mut processor, &ctx, false));
        assert_eq!(processor.0, vec!["<root>", "artifact 'Lib'"]);
    }

    #[test]
    fn substitution_path_contains_complex_element() {
        let ctx = cyclic_context();
        let artifact = ctx.find_artifact("App").unwrap();
        let mut paths = Vec::new();
        process_artifact_elements(
            &artifact,
            Some(ElementType::FileCopy),
            &mut from_fn(|_: &ElementRef, p: &ElementPath| {
                paths.push(p.artifact_names());
                true
            }),
            &ctx,
            true,
        );
        assert_eq!(paths, vec![vec![], vec!["Lib".to_string()]]);
    }

    #[test]
    fn skipping_included_artifacts() {
        let ctx = cyclic_context();
        let artifact = ctx.find_artifact("App").unwrap();
        let mut files = 0;
        process_recursively_skipping_included_artifacts(&artifact, &ctx, &mut |e: &ElementRef| {
            if e.element_type() == ElementType::FileCopy {
                files += 1;
            }
            true
        });
        assert_eq!(files, 1);
    }

    #[test]
    fn with_substitutions_inlines_complex_elements() {
        let ctx = cyclic_context();
        let app = ctx.find_artifact("App").unwrap();
        let mut seen = Vec::new();
        process_elements_with_substitutions(
            &app.root_ref().children(),
            &ctx,
            app.artifact_type(),
            &ElementPath::EMPTY,
            &mut from_fn(|e: &ElementRef, _: &ElementPath| {
                seen.push(e.element().to_string());
                true
            }),
        );
        // lib/ is yielded as is, Lib is replaced by b.txt, and the nested
        // reference back to App inlines App's children which were already seen.
        assert_eq!(seen, vec!["lib/", "file '/res/b.txt'"]);
    }

    #[test]
    fn relative_path_lookup() {
        let ctx = cyclic_context();
        let app = ctx.find_artifact("App").unwrap();
        let found = find_by_relative_path(&app.root_ref(), "/lib/a.jar", &ctx, app.artifact_type());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].element(), &PackagingElement::file_copy("/libs/a.jar"));

        let via_substitution = find_by_relative_path(&app.root_ref(), "lib/b.txt", &ctx, app.artifact_type());
        assert_eq!(via_substitution.len(), 1);

        assert!(find_by_relative_path(&app.root_ref(), "", &ctx, app.artifact_type()).is_empty());
        assert!(find_by_relative_path(&app.root_ref(), "missing", &ctx, app.artifact_type()).is_empty());
    }

    #[test]
    fn directory_children() {
        let ctx = FixedContext::new(vec![
            data("App", |t| {
                let root = t.root();
                let lib = t.add_child(root, PackagingElement::directory("lib")).unwrap();
                t.add_child(lib, PackagingElement::file_copy("/libs/a.jar")).unwrap();
                t.add_child(lib, PackagingElement::artifact("Lib")).unwrap();
            }),
            data("Lib", |t| {
                let root = t.root();
                t.add_child(root, PackagingElement::file_copy("/res/b.txt")).unwrap();
            }),
        ]);
        let app = ctx.find_artifact("App").unwrap();
        let mut seen = Vec::new();
        process_directory_children(
            &app.root_ref(),
            &ElementPath::EMPTY,
            "lib",
            &ctx,
            app.artifact_type(),
            &mut from_fn(|e: &ElementRef, p: &ElementPath| {
                seen.push((e.element().to_string(), p.path_string()));
                true
            }),
        );
        assert_eq!(
            seen,
            vec![
                ("file '/libs/a.jar'".to_string(), "lib".to_string()),
                ("file '/res/b.txt'".to_string(), "lib".to_string()),
            ]
        );
    }
}
