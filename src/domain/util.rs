//! Artifact utilities: layout, reverse lookups, module queries and path helpers

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;

use super::artifact::{Artifact, ArtifactTypeId};
use super::context::{module_source_roots, resolve_substitution, ResolvingContext};
use super::element::{ContentKind, ElementId, ElementRef, ElementType, PackagingElement, PackagingTree};
use super::path::ElementPath;
use super::processor::{
    from_fn, process_artifact_elements, process_elements_with_substitutions, ElementProcessor,
};

// ============================================================================
// Layout
// ============================================================================

/// Where the content at one output path comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutSource {
    File { path: String },
    DirectoryContents { path: String },
    ArchiveContents { archive: String, path_in_archive: String },
    ModuleOutput { module: String, content: ContentKind, output: Option<String> },
    /// An empty directory or archive
    Empty,
    /// Reference to an artifact that is already being laid out
    Cyclic { artifact: String },
    /// Complex element with a missing or opaque target
    Unresolved { element: String },
}

impl fmt::Display for LayoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutSource::File { path } => write!(f, "{}", path),
            LayoutSource::DirectoryContents { path } => write!(f, "{}/*", path),
            LayoutSource::ArchiveContents {
                archive,
                path_in_archive,
            } => write!(f, "{}!{}", archive, path_in_archive),
            LayoutSource::ModuleOutput {
                module,
                content,
                output,
            } => match output {
                Some(output) => write!(f, "{} ({} output of '{}')", output, content.as_str(), module),
                None => write!(f, "{} output of '{}'", content.as_str(), module),
            },
            LayoutSource::Empty => write!(f, "(empty)"),
            LayoutSource::Cyclic { artifact } => write!(f, "(cyclic reference to '{}')", artifact),
            LayoutSource::Unresolved { element } => write!(f, "(unresolved {})", element),
        }
    }
}

/// One output path of an artifact and its source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutEntry {
    pub output_path: String,
    pub source: LayoutSource,
}

struct LayoutCollector<'a> {
    ctx: &'a dyn ResolvingContext,
    artifact_type: &'a ArtifactTypeId,
    root_name: &'a str,
    active: Vec<String>,
    entries: &'a mut Vec<LayoutEntry>,
}

impl LayoutCollector<'_> {
    fn push(&mut self, output_path: String, source: LayoutSource) {
        self.entries.push(LayoutEntry {
            output_path,
            source,
        });
    }

    fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|n| n == name)
    }
}

impl ElementProcessor for LayoutCollector<'_> {
    fn should_process_substitution(&mut self, element: &ElementRef) -> bool {
        match element.element() {
            // Embedded artifacts are expanded in `process`
            PackagingElement::ModuleOutput { .. } | PackagingElement::Artifact { .. } => false,
            _ => resolve_substitution(element, self.ctx, self.artifact_type).is_some(),
        }
    }

    fn process(&mut self, element: &ElementRef, path: &ElementPath) -> bool {
        let dir = path.path_string();
        match element.element() {
            data if data.is_composite() => {
                let inner = path.append_composite(element.clone());
                let children = element.children();
                if children.is_empty() {
                    self.push(inner.path_string(), LayoutSource::Empty);
                } else {
                    layout_level(&children, &inner, self.ctx, self.artifact_type, self.root_name, self.entries);
                }
            }
            PackagingElement::FileCopy { path: source, .. } => {
                let name = element.element().output_file_name().unwrap_or_default();
                self.push(concat_paths(&[dir.as_str(), name]), LayoutSource::File { path: source.clone() });
            }
            PackagingElement::DirectoryCopy { path: source } => {
                self.push(dir, LayoutSource::DirectoryContents { path: source.clone() });
            }
            PackagingElement::ExtractedDirectory {
                archive_path,
                path_in_archive,
            } => {
                self.push(
                    dir,
                    LayoutSource::ArchiveContents {
                        archive: archive_path.clone(),
                        path_in_archive: path_in_archive.clone(),
                    },
                );
            }
            PackagingElement::ModuleOutput {
                module_name,
                content,
            } => {
                let output = self
                    .ctx
                    .find_module(module_name)
                    .and_then(|m| m.output_for(*content))
                    .map(str::to_string);
                self.push(
                    dir,
                    LayoutSource::ModuleOutput {
                        module: module_name.clone(),
                        content: *content,
                        output,
                    },
                );
            }
            PackagingElement::Artifact { artifact_name } if self.is_active(artifact_name) => {
                self.push(
                    dir,
                    LayoutSource::Cyclic {
                        artifact: artifact_name.clone(),
                    },
                );
            }
            PackagingElement::Artifact { .. } => {
                match resolve_substitution(element, self.ctx, self.artifact_type) {
                    Some(substitution) => layout_level(
                        &substitution,
                        &path.append_complex(element.clone()),
                        self.ctx,
                        self.artifact_type,
                        self.root_name,
                        self.entries,
                    ),
                    None => self.push(
                        dir,
                        LayoutSource::Unresolved {
                            element: element.element().to_string(),
                        },
                    ),
                }
            }
            other => {
                self.push(
                    dir,
                    LayoutSource::Unresolved {
                        element: other.to_string(),
                    },
                );
            }
        }
        true
    }
}

fn layout_level(
    elements: &[ElementRef],
    path: &ElementPath,
    ctx: &dyn ResolvingContext,
    artifact_type: &ArtifactTypeId,
    root_name: &str,
    entries: &mut Vec<LayoutEntry>,
) {
    let mut active = vec![root_name.to_string()];
    active.extend(path.artifact_names());
    let mut collector = LayoutCollector {
        ctx,
        artifact_type,
        root_name,
        active,
        entries,
    };
    process_elements_with_substitutions(elements, ctx, artifact_type, path, &mut collector);
}

/// Lists the output paths an artifact produces, with embedded artifacts and
/// libraries inlined.
///
/// References that lead back to an artifact already on the current path are
/// reported as [`LayoutSource::Cyclic`] instead of being expanded.
pub fn artifact_layout(artifact: &Artifact, ctx: &dyn ResolvingContext) -> Vec<LayoutEntry> {
    let root = artifact.root_ref();
    let path = ElementPath::EMPTY.append_composite(root.clone());
    let children = root.children();
    let mut entries = Vec::new();
    if children.is_empty() {
        if root.element_type() != ElementType::Root {
            entries.push(LayoutEntry {
                output_path: path.path_string(),
                source: LayoutSource::Empty,
            });
        }
        return entries;
    }
    layout_level(
        &children,
        &path,
        ctx,
        artifact.artifact_type(),
        artifact.name(),
        &mut entries,
    );
    entries
}

// ============================================================================
// Reverse lookups
// ============================================================================

/// Candidate source paths for the file at `output_path` inside `parent`.
///
/// Candidates are not checked against the file system. Extracted entries are
/// reported as `<archive>!/<entry>`.
pub fn find_source_files_by_output_path(
    parent: &ElementRef,
    output_path: &str,
    ctx: &dyn ResolvingContext,
    artifact_type: &ArtifactTypeId,
) -> Vec<String> {
    let path = output_path.trim_start_matches('/');
    if path.is_empty() {
        return Vec::new();
    }
    let (first, tail) = path.split_once('/').unwrap_or((path, ""));

    let mut result = Vec::new();
    process_elements_with_substitutions(
        &parent.children(),
        ctx,
        artifact_type,
        &ElementPath::EMPTY,
        &mut from_fn(|element: &ElementRef, _: &ElementPath| {
            let data = element.element();
            match data {
                _ if data.is_composite() => {
                    if data.composite_name() == Some(first) {
                        result.extend(find_source_files_by_output_path(element, tail, ctx, artifact_type));
                    }
                }
                PackagingElement::FileCopy { path: source, .. } => {
                    if tail.is_empty() && data.output_file_name() == Some(first) {
                        result.push(source.clone());
                    }
                }
                PackagingElement::DirectoryCopy { path: source } => {
                    result.push(concat_paths(&[source.as_str(), path]));
                }
                PackagingElement::ExtractedDirectory {
                    archive_path,
                    path_in_archive,
                } => {
                    let entry = concat_paths(&[path_in_archive.as_str(), path]);
                    result.push(format!("{}!/{}", archive_path, trim_forward_slashes(&entry)));
                }
                PackagingElement::ModuleOutput { .. } => {
                    for root in module_source_roots(data, ctx) {
                        result.push(concat_paths(&[root.as_str(), path]));
                    }
                }
                _ => {}
            }
            true
        }),
    );
    result
}

/// An artifact that packages a given source file
#[derive(Debug, Clone)]
pub struct ContainingArtifact {
    pub artifact: Artifact,
    /// Path to the element that copies the file
    pub path: ElementPath,
    /// Location of the file relative to that element's output directory
    pub relative_path: String,
}

impl ContainingArtifact {
    /// Output path of the file inside the artifact
    pub fn output_path(&self) -> String {
        concat_paths(&[self.path.path_string().as_str(), self.relative_path.as_str()])
    }
}

fn trim_trailing_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        path
    } else {
        trimmed
    }
}

/// Path of `file` below `root`, or `None` if it is not inside. A file equal to
/// `root` yields an empty path unless `strict`.
fn relative_to(root: &str, file: &str, strict: bool) -> Option<String> {
    let root = trim_trailing_slashes(root);
    let file = trim_trailing_slashes(file);
    if root == file {
        return (!strict).then(String::new);
    }
    let rest = file.strip_prefix(root)?;
    let rest = if root.ends_with('/') {
        rest
    } else {
        rest.strip_prefix('/')?
    };
    Some(rest.to_string())
}

/// Finds, for each artifact, the first element that packages `file`
pub fn find_containing_artifacts_with_output_paths(
    file: &str,
    artifacts: &[Artifact],
    ctx: &dyn ResolvingContext,
) -> Vec<ContainingArtifact> {
    let mut result = Vec::new();
    for artifact in artifacts {
        process_artifact_elements(
            artifact,
            None,
            &mut from_fn(|element: &ElementRef, path: &ElementPath| {
                let data = element.element();
                let relative = match data {
                    PackagingElement::FileCopy { path: source, .. } => {
                        relative_to(source, file, false).map(|rel| {
                            if rel.is_empty() {
                                data.output_file_name().unwrap_or_default().to_string()
                            } else {
                                rel
                            }
                        })
                    }
                    PackagingElement::DirectoryCopy { path: source } => relative_to(source, file, false),
                    PackagingElement::ModuleOutput { .. } => module_source_roots(data, ctx)
                        .iter()
                        .find_map(|root| relative_to(root, file, true)),
                    _ => None,
                };
                match relative {
                    Some(relative_path) => {
                        result.push(ContainingArtifact {
                            artifact: artifact.clone(),
                            path: path.clone(),
                            relative_path,
                        });
                        false
                    }
                    None => true,
                }
            }),
            ctx,
            true,
        );
    }
    result
}

/// Composite parents of an element, nearest first, each with its artifact
pub type ParentChain = Vec<(Artifact, ElementRef)>;

struct ParentWalk<'a> {
    ctx: &'a dyn ResolvingContext,
    processor: &'a mut dyn FnMut(&ElementRef, &ParentChain, &Artifact) -> bool,
    max_level: usize,
    processed: HashSet<String>,
}

struct EmbeddingFinder<'a, 'w> {
    walk: &'a mut ParentWalk<'w>,
    target: &'a Artifact,
    embedder: &'a Artifact,
    path_from_root: &'a ParentChain,
}

impl ElementProcessor for EmbeddingFinder<'_, '_> {
    fn should_process_substitution(&mut self, element: &ElementRef) -> bool {
        element.element_type() != ElementType::Artifact
    }

    fn process(&mut self, element: &ElementRef, path: &ElementPath) -> bool {
        if element.element().artifact_name() != Some(self.target.name()) {
            return true;
        }
        let mut current = self.path_from_root.clone();
        let parents = path.parents();
        if let Some((outermost, inner)) = parents.split_last() {
            for parent in inner {
                if !(self.walk.processor)(parent, &current, self.embedder) {
                    return false;
                }
                current.insert(0, (self.embedder.clone(), parent.clone()));
                if current.len() > self.walk.max_level {
                    return true;
                }
            }
            if outermost.element_type() == ElementType::Root
                && !(self.walk.processor)(outermost, &current, self.embedder)
            {
                return false;
            }
        }
        self.walk.visit(self.embedder, current)
    }
}

impl ParentWalk<'_> {
    fn visit(&mut self, artifact: &Artifact, path_to_element: ParentChain) -> bool {
        if !self.processed.insert(artifact.name().to_string()) {
            return true;
        }

        let root = artifact.root_ref();
        let mut path_from_root = path_to_element;
        if root.element_type() != ElementType::Root {
            if !(self.processor)(&root, &path_from_root, artifact) {
                return false;
            }
            path_from_root.insert(0, (artifact.clone(), root));
        }
        if path_from_root.len() > self.max_level {
            return true;
        }

        let ctx = self.ctx;
        for embedder in ctx.artifact_model().artifacts() {
            if self.processed.contains(embedder.name()) {
                continue;
            }
            let mut finder = EmbeddingFinder {
                walk: self,
                target: artifact,
                embedder: &embedder,
                path_from_root: &path_from_root,
            };
            if !process_artifact_elements(&embedder, Some(ElementType::Artifact), &mut finder, ctx, true) {
                return false;
            }
        }
        true
    }
}

/// Walks the composites that contain `artifact`, across embedding
/// artifacts, up to `max_level` levels.
///
/// The processor receives each parent, the chain of parents below it (nearest
/// first) and the artifact owning the parent. Returns `false` if the
/// processor stopped the walk.
pub fn process_parents(
    artifact: &Artifact,
    ctx: &dyn ResolvingContext,
    processor: &mut dyn FnMut(&ElementRef, &ParentChain, &Artifact) -> bool,
    max_level: usize,
) -> bool {
    let mut walk = ParentWalk {
        ctx,
        processor,
        max_level,
        processed: HashSet::new(),
    };
    walk.visit(artifact, Vec::new())
}

// ============================================================================
// Module queries
// ============================================================================

/// Modules whose output is packaged by a set of artifacts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludedModules {
    pub modules: BTreeSet<String>,
    pub includes_test_scope: bool,
}

pub fn modules_included_in_artifacts(artifacts: &[Artifact], ctx: &dyn ResolvingContext) -> IncludedModules {
    let mut included = IncludedModules::default();
    for artifact in artifacts {
        process_artifact_elements(
            artifact,
            Some(ElementType::ModuleOutput),
            &mut from_fn(|element: &ElementRef, _: &ElementPath| {
                if let PackagingElement::ModuleOutput {
                    module_name,
                    content,
                } = element.element()
                {
                    if ctx.find_module(module_name).is_some() {
                        included.modules.insert(module_name.clone());
                        if *content == ContentKind::Test {
                            included.includes_test_scope = true;
                        }
                    }
                }
                true
            }),
            ctx,
            true,
        );
    }
    included
}

/// Artifacts that package the production output of `module_name`, directly
/// or through an embedded artifact found earlier
pub fn artifacts_containing_module_output(module_name: &str, ctx: &dyn ResolvingContext) -> Vec<Artifact> {
    let mut result: Vec<Artifact> = Vec::new();
    for artifact in ctx.artifact_model().sorted_artifacts() {
        let names: HashSet<String> = result.iter().map(|a| a.name().to_string()).collect();
        let contains = !process_artifact_elements(
            &artifact,
            None,
            &mut from_fn(|element: &ElementRef, _: &ElementPath| match element.element() {
                PackagingElement::ModuleOutput {
                    module_name: name,
                    content: ContentKind::Production,
                } => !(name == module_name && ctx.find_module(name).is_some()),
                PackagingElement::Artifact { artifact_name } => !names.contains(artifact_name),
                _ => true,
            }),
            ctx,
            true,
        );
        if contains {
            result.push(artifact);
        }
    }
    result
}

/// Valid artifacts with a non-empty output path, in name order
pub fn artifacts_with_output_paths(ctx: &dyn ResolvingContext) -> Vec<Artifact> {
    ctx.artifact_model()
        .sorted_artifacts()
        .into_iter()
        .filter(|a| a.output_path().is_some_and(|p| !p.is_empty()))
        .collect()
}

// ============================================================================
// Path helpers
// ============================================================================

/// Strips leading `/` and `\` characters
pub fn trim_forward_slashes(path: &str) -> &str {
    path.trim_start_matches(['/', '\\'])
}

/// Joins non-empty parts with a single `/`
pub fn concat_paths(parts: &[&str]) -> String {
    let mut result = String::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if result.is_empty() {
            result.push_str(part);
            continue;
        }
        if !result.ends_with(['/', '\\']) {
            result.push('/');
        }
        result.push_str(trim_forward_slashes(part));
    }
    result
}

/// Appends `relative` to `base` with exactly one separator between them
pub fn append_to_path(base: &str, relative: &str) -> String {
    let ends_with_slash = base.ends_with(['/', '\\']);
    let starts_with_slash = relative.starts_with(['/', '\\']);
    if ends_with_slash && starts_with_slash {
        format!("{}{}", base, trim_forward_slashes(relative))
    } else if !ends_with_slash && !starts_with_slash && !base.is_empty() && !relative.is_empty() {
        format!("{}/{}", base, relative)
    } else {
        format!("{}{}", base, relative)
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File name for an artifact's archive or output directory
pub fn suggest_artifact_file_name(artifact_name: &str) -> String {
    sanitize_file_name(artifact_name)
}

/// `<output_root>/artifacts/<sanitized name>`
pub fn default_artifact_output_path(artifact_name: &str, output_root: &str) -> String {
    append_to_path(
        output_root,
        &format!("artifacts/{}", sanitize_file_name(artifact_name)),
    )
}

/// Returns `prefix + suffix`, or `prefix2 + suffix`, ... for the first name
/// not used by a directory or archive below `parent`
pub fn suggest_file_name(tree: &PackagingTree, parent: ElementId, prefix: &str, suffix: &str) -> String {
    let mut name = format!("{}{}", prefix, suffix);
    let mut i = 2;
    while tree.find_composite_child(parent, &name).is_some() {
        name = format!("{}{}{}", prefix, i, suffix);
        i += 1;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::ArtifactData;
    use crate::domain::context::testing::FixedContext;
    use crate::domain::context::{Library, Module};
    use crate::domain::element::LibraryLevel;

    fn artifact(name: &str, artifact_type: ArtifactTypeId, build: impl FnOnce(&mut PackagingTree)) -> ArtifactData {
        let mut tree = PackagingTree::with_artifact_root();
        build(&mut tree);
        ArtifactData::new(name, artifact_type, tree)
    }

    fn app_and_lib() -> FixedContext {
        let mut ctx = FixedContext::new(vec![
            artifact("App", ArtifactTypeId::plain(), |t| {
                let root = t.root();
                let lib = t.add_child(root, PackagingElement::directory("lib")).unwrap();
                t.add_child(lib, PackagingElement::artifact("Lib")).unwrap();
                t.add_child(root, PackagingElement::file_copy("/src/index.html")).unwrap();
                t.add_child(root, PackagingElement::module_output("core", ContentKind::Production))
                    .unwrap();
            }),
            artifact("Lib", ArtifactTypeId::zip(), |t| {
                let root = t.root();
                t.add_child(root, PackagingElement::directory_copy("/assets")).unwrap();
                t.add_child(root, PackagingElement::library(LibraryLevel::Project, "json", None))
                    .unwrap();
            }),
        ]);
        ctx.structure.modules.push(Module {
            name: "core".to_string(),
            source_roots: vec!["/core/src".to_string()],
            output: Some("/out/core".to_string()),
            ..Module::default()
        });
        ctx.structure.libraries.push(Library {
            name: "json".to_string(),
            files: vec!["/libs/json.jar".to_string()],
            ..Library::default()
        });
        ctx
    }

    fn outputs(entries: &[LayoutEntry]) -> Vec<(&str, String)> {
        entries
            .iter()
            .map(|e| (e.output_path.as_str(), e.source.to_string()))
            .collect()
    }

    #[test]
    fn layout_inlines_artifacts_and_libraries() {
        let ctx = app_and_lib();
        let app = ctx.artifact_model().find_artifact("App").unwrap();
        let layout = artifact_layout(&app, &ctx);
        assert_eq!(
            outputs(&layout),
            vec![
                ("lib", "/assets/*".to_string()),
                ("lib/json.jar", "/libs/json.jar".to_string()),
                ("index.html", "/src/index.html".to_string()),
                ("", "/out/core (production output of 'core')".to_string()),
            ]
        );
    }

    #[test]
    fn layout_reports_cycles_and_missing_targets() {
        let ctx = FixedContext::new(vec![
            artifact("App", ArtifactTypeId::plain(), |t| {
                let root = t.root();
                let dir = t.add_child(root, PackagingElement::directory("nested")).unwrap();
                t.add_child(dir, PackagingElement::artifact("Lib")).unwrap();
                t.add_child(root, PackagingElement::artifact("Ghost")).unwrap();
            }),
            artifact("Lib", ArtifactTypeId::plain(), |t| {
                let root = t.root();
                let dir = t.add_child(root, PackagingElement::directory("back")).unwrap();
                t.add_child(dir, PackagingElement::artifact("App")).unwrap();
                t.add_child(dir, PackagingElement::artifact("Lib")).unwrap();
            }),
        ]);
        let app = ctx.artifact_model().find_artifact("App").unwrap();
        let layout = artifact_layout(&app, &ctx);
        assert_eq!(
            layout,
            vec![
                LayoutEntry {
                    output_path: "nested/back".to_string(),
                    source: LayoutSource::Cyclic {
                        artifact: "App".to_string()
                    },
                },
                LayoutEntry {
                    output_path: "nested/back".to_string(),
                    source: LayoutSource::Cyclic {
                        artifact: "Lib".to_string()
                    },
                },
                LayoutEntry {
                    output_path: String::new(),
                    source: LayoutSource::Unresolved {
                        element: "artifact 'Ghost'".to_string()
                    },
                },
            ]
        );
    }

    #[test]
    fn layout_marks_cycles_between_root_level_references() {
        let ctx = FixedContext::new(vec![
            artifact("App", ArtifactTypeId::plain(), |t| {
                let root = t.root();
                t.add_child(root, PackagingElement::file_copy("/app.txt")).unwrap();
                t.add_child(root, PackagingElement::artifact("Lib")).unwrap();
            }),
            artifact("Lib", ArtifactTypeId::plain(), |t| {
                let root = t.root();
                t.add_child(root, PackagingElement::file_copy("/lib.txt")).unwrap();
                t.add_child(root, PackagingElement::artifact("Lib2")).unwrap();
            }),
            artifact("Lib2", ArtifactTypeId::plain(), |t| {
                let root = t.root();
                t.add_child(root, PackagingElement::file_copy("/lib2.txt")).unwrap();
                t.add_child(root, PackagingElement::artifact("Lib")).unwrap();
            }),
        ]);
        let app = ctx.artifact_model().find_artifact("App").unwrap();
        let layout = artifact_layout(&app, &ctx);
        assert_eq!(
            outputs(&layout),
            vec![
                ("app.txt", "/app.txt".to_string()),
                ("lib.txt", "/lib.txt".to_string()),
                ("lib2.txt", "/lib2.txt".to_string()),
                ("", "(cyclic reference to 'Lib')".to_string()),
            ]
        );
    }

    #[test]
    fn empty_archive_root_has_one_entry() {
        let ctx = FixedContext::new(vec![ArtifactData::new(
            "Dist",
            ArtifactTypeId::zip(),
            PackagingTree::with_root(PackagingElement::archive("dist.zip")).unwrap(),
        )]);
        let dist = ctx.artifact_model().find_artifact("Dist").unwrap();
        assert_eq!(
            artifact_layout(&dist, &ctx),
            vec![LayoutEntry {
                output_path: "dist.zip".to_string(),
                source: LayoutSource::Empty,
            }]
        );
    }

    #[test]
    fn source_files_by_output_path() {
        let ctx = app_and_lib();
        let app = ctx.artifact_model().find_artifact("App").unwrap();
        let root = app.root_ref();
        let ty = app.artifact_type();

        assert_eq!(
            find_source_files_by_output_path(&root, "index.html", &ctx, ty),
            vec!["/src/index.html", "/core/src/index.html"]
        );
        assert_eq!(
            find_source_files_by_output_path(&root, "/lib/json.jar", &ctx, ty),
            vec!["/assets/json.jar", "/libs/json.jar", "/core/src/lib/json.jar"]
        );
        assert_eq!(
            find_source_files_by_output_path(&root, "app/Main.class", &ctx, ty),
            vec!["/core/src/app/Main.class"]
        );
        assert!(find_source_files_by_output_path(&root, "", &ctx, ty).is_empty());
    }

    #[test]
    fn containing_artifacts_for_a_file() {
        let ctx = app_and_lib();
        let artifacts = ctx.artifact_model().sorted_artifacts();

        let found = find_containing_artifacts_with_output_paths("/assets/css/site.css", &artifacts, &ctx);
        let summary: Vec<(String, String)> = found
            .iter()
            .map(|c| (c.artifact.name().to_string(), c.output_path()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("App".to_string(), "lib/css/site.css".to_string()),
                ("Lib".to_string(), "css/site.css".to_string()),
            ]
        );

        let found = find_containing_artifacts_with_output_paths("/src/index.html", &artifacts, &ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].output_path(), "index.html");

        let found = find_containing_artifacts_with_output_paths("/core/src/app/Main.java", &artifacts, &ctx);
        assert_eq!(found[0].output_path(), "app/Main.java");

        assert!(find_containing_artifacts_with_output_paths("/elsewhere", &artifacts, &ctx).is_empty());
    }

    fn archive_lib() -> FixedContext {
        let lib = PackagingTree::with_root(PackagingElement::archive("lib.jar")).unwrap();
        FixedContext::new(vec![
            artifact("App", ArtifactTypeId::plain(), |t| {
                let root = t.root();
                let dir = t.add_child(root, PackagingElement::directory("lib")).unwrap();
                t.add_child(dir, PackagingElement::artifact("Lib")).unwrap();
            }),
            ArtifactData::new("Lib", ArtifactTypeId::zip(), lib),
        ])
    }

    #[test]
    fn parents_cross_artifact_boundaries() {
        let ctx = archive_lib();
        let lib = ctx.artifact_model().find_artifact("Lib").unwrap();
        let mut seen = Vec::new();
        let completed = process_parents(
            &lib,
            &ctx,
            &mut |parent: &ElementRef, chain: &ParentChain, owner: &Artifact| {
                seen.push((owner.name().to_string(), parent.element().to_string(), chain.len()));
                true
            },
            10,
        );
        assert!(completed);
        assert_eq!(
            seen,
            vec![
                ("Lib".to_string(), "lib.jar".to_string(), 0),
                ("App".to_string(), "lib/".to_string(), 1),
                ("App".to_string(), "<root>".to_string(), 2),
            ]
        );
    }

    #[test]
    fn parents_stop_at_max_level() {
        let ctx = archive_lib();
        let lib = ctx.artifact_model().find_artifact("Lib").unwrap();
        let mut count = 0;
        process_parents(
            &lib,
            &ctx,
            &mut |_: &ElementRef, _: &ParentChain, _: &Artifact| {
                count += 1;
                true
            },
            0,
        );
        assert_eq!(count, 1);
    }

    #[test]
    fn module_queries() {
        let ctx = app_and_lib();
        let artifacts = ctx.artifact_model().artifacts();
        let included = modules_included_in_artifacts(&artifacts, &ctx);
        assert_eq!(included.modules.into_iter().collect::<Vec<_>>(), vec!["core"]);
        assert!(!included.includes_test_scope);

        let containing: Vec<_> = artifacts_containing_module_output("core", &ctx)
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(containing, vec!["App"]);
        assert!(artifacts_containing_module_output("missing", &ctx).is_empty());
    }

    #[test]
    fn artifacts_with_output_paths_skips_unset() {
        let mut with_output = artifact("Dist", ArtifactTypeId::plain(), |_| {});
        with_output.set_output_path(Some("/out/dist".to_string()));
        let ctx = FixedContext::new(vec![artifact("App", ArtifactTypeId::plain(), |_| {}), with_output]);
        let names: Vec<_> = artifacts_with_output_paths(&ctx)
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["Dist"]);
    }

    #[test]
    fn path_helpers() {
        assert_eq!(trim_forward_slashes("//a/b"), "a/b");
        assert_eq!(concat_paths(&["a", "", "/b", "c/"]), "a/b/c/");
        assert_eq!(concat_paths(&["/root/", "/x"]), "/root/x");
        assert_eq!(concat_paths(&["", "x"]), "x");
        assert_eq!(append_to_path("out/", "/x"), "out/x");
        assert_eq!(append_to_path("out", "x"), "out/x");
        assert_eq!(append_to_path("", "x"), "x");
        assert_eq!(append_to_path("out", ""), "out");
    }

    #[test]
    fn artifact_file_names() {
        assert_eq!(suggest_artifact_file_name("My App:1.0"), "My_App_1.0");
        assert_eq!(default_artifact_output_path("My App", "/work/out"), "/work/out/artifacts/My_App");
    }

    #[test]
    fn suggested_file_names_skip_existing_composites() {
        let mut tree = PackagingTree::with_artifact_root();
        let root = tree.root();
        tree.add_child(root, PackagingElement::archive("app.jar")).unwrap();
        tree.add_child(root, PackagingElement::directory("app2.jar")).unwrap();
        assert_eq!(suggest_file_name(&tree, root, "app", ".jar"), "app3.jar");
        assert_eq!(suggest_file_name(&tree, root, "web", ".war"), "web.war");
    }
}
