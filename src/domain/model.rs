//! Artifact models and the commit engine
//!
//! The [`ArtifactManager`] owns the live model: an ordered list of artifact
//! handles, each pointing at a generation-versioned slot of immutable
//! [`ArtifactData`]. Readers take a [`ModelSnapshot`], which stays consistent
//! (and stale) after later commits.
//!
//! Writers work on a [`ModifiableArtifactModel`]. It shares all data with the
//! live model until an artifact is edited, at which point only that artifact
//! is copied. [`ArtifactManager::commit`] diffs the modifiable model against
//! the live one, installs the new state under the same handles and publishes
//! events: all removals, then all additions, then all changes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use super::artifact::{Artifact, ArtifactData, ArtifactHandle, ArtifactTypeId, ArtifactTypeRegistry};
use super::context::{ArtifactModel, ProjectStructure, ResolvingContext};
use super::element::PackagingTree;
use super::graph::ArtifactGraph;
use super::sorting::{SortedArtifacts, SortingCache};
use super::state::{self, ArtifactState, ElementTypeRegistry};

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Unknown artifact type: {0}")]
    UnknownArtifactType(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact '{0}' already exists")]
    DuplicateName(String),

    #[error("Artifact name cannot be empty")]
    EmptyName,

    #[error("Artifact '{0}' is invalid and cannot be edited")]
    InvalidArtifact(String),
}

/// Change notification published after a commit
#[derive(Debug, Clone)]
pub enum ArtifactEvent {
    Removed(Artifact),
    Added(Artifact),
    Changed { artifact: Artifact, old_name: String },
}

impl ArtifactEvent {
    pub fn artifact(&self) -> &Artifact {
        match self {
            ArtifactEvent::Removed(artifact) | ArtifactEvent::Added(artifact) => artifact,
            ArtifactEvent::Changed { artifact, .. } => artifact,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactEvent::Removed(_) => "removed",
            ArtifactEvent::Added(_) => "added",
            ArtifactEvent::Changed { .. } => "changed",
        }
    }
}

/// Receives commit events, in publication order
pub trait ArtifactListener: Send + Sync {
    fn artifact_event(&self, manager: &ArtifactManager, event: &ArtifactEvent);
}

/// Names affected by one commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitSummary {
    pub removed: Vec<String>,
    pub added: Vec<String>,
    /// `(old name, new name)` pairs
    pub changed: Vec<(String, String)>,
    pub modification_count: u64,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }
}

/// Outcome of loading persisted artifacts
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub valid: usize,
    /// `(artifact name, reason)` for artifacts that failed to load
    pub invalid: Vec<(String, String)>,
    pub commit: CommitSummary,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u64,
    data: Arc<ArtifactData>,
}

impl Slot {
    fn artifact(&self, handle: ArtifactHandle) -> Artifact {
        Artifact::new(handle, self.generation, Arc::clone(&self.data))
    }
}

#[derive(Debug, Default)]
struct LiveModel {
    order: Vec<ArtifactHandle>,
    slots: HashMap<ArtifactHandle, Slot>,
    modification_count: u64,
}

struct CommitGuard<'a>(&'a AtomicBool);

impl<'a> CommitGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        if flag.swap(true, Ordering::SeqCst) {
            panic!("recursive commit: an artifact model commit is already in progress");
        }
        Self(flag)
    }
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owner of the live artifact model
pub struct ArtifactManager {
    element_types: Arc<ElementTypeRegistry>,
    artifact_types: Arc<ArtifactTypeRegistry>,
    structure: RwLock<Arc<ProjectStructure>>,
    live: RwLock<LiveModel>,
    next_handle: Arc<AtomicU64>,
    inside_commit: AtomicBool,
    listeners: RwLock<Vec<Arc<dyn ArtifactListener>>>,
    sorting: SortingCache,
}

impl ArtifactManager {
    pub fn new(
        element_types: ElementTypeRegistry,
        artifact_types: ArtifactTypeRegistry,
        structure: ProjectStructure,
    ) -> Self {
        Self {
            element_types: Arc::new(element_types),
            artifact_types: Arc::new(artifact_types),
            structure: RwLock::new(Arc::new(structure)),
            live: RwLock::new(LiveModel::default()),
            next_handle: Arc::new(AtomicU64::new(1)),
            inside_commit: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
            sorting: SortingCache::new(),
        }
    }

    /// Manager with the built-in element and artifact types
    pub fn with_builtin_types(structure: ProjectStructure) -> Self {
        Self::new(
            ElementTypeRegistry::with_builtin_types(),
            ArtifactTypeRegistry::with_builtin_types(),
            structure,
        )
    }

    pub fn element_types(&self) -> &ElementTypeRegistry {
        &self.element_types
    }

    pub fn artifact_types(&self) -> &ArtifactTypeRegistry {
        &self.artifact_types
    }

    pub fn structure(&self) -> Arc<ProjectStructure> {
        Arc::clone(&self.structure.read())
    }

    pub fn set_structure(&self, structure: ProjectStructure) {
        *self.structure.write() = Arc::new(structure);
    }

    pub fn add_listener(&self, listener: Arc<dyn ArtifactListener>) {
        self.listeners.write().push(listener);
    }

    /// Incremented once per commit
    pub fn modification_count(&self) -> u64 {
        self.live.read().modification_count
    }

    /// Consistent read-only view of the live model
    pub fn snapshot(&self) -> ModelSnapshot {
        let live = self.live.read();
        let artifacts = live
            .order
            .iter()
            .filter_map(|handle| live.slots.get(handle).map(|slot| slot.artifact(*handle)))
            .collect();
        ModelSnapshot {
            artifacts: Arc::new(artifacts),
            modification_count: live.modification_count,
            structure: self.structure(),
            artifact_types: Arc::clone(&self.artifact_types),
        }
    }

    /// Current generation of the artifact behind `handle`
    pub fn artifact(&self, handle: ArtifactHandle) -> Option<Artifact> {
        self.live.read().slots.get(&handle).map(|slot| slot.artifact(handle))
    }

    pub fn find_artifact(&self, name: &str) -> Option<Artifact> {
        self.snapshot().find_artifact(name)
    }

    /// Starts a new transaction on top of the live model
    pub fn create_modifiable_model(&self) -> ModifiableArtifactModel {
        let live = self.live.read();
        ModifiableArtifactModel {
            base_modification_count: live.modification_count,
            order: live.order.clone(),
            original_order: live.order.clone(),
            originals: live.slots.clone(),
            copies: HashMap::new(),
            next_handle: Arc::clone(&self.next_handle),
            structure: self.structure(),
            artifact_types: Arc::clone(&self.artifact_types),
        }
    }

    /// Installs the modifiable model as the new live state and publishes
    /// removed, added and changed events, in that order.
    ///
    /// # Panics
    ///
    /// Panics when called while another commit is running, including from a
    /// listener of this manager.
    pub fn commit(&self, model: ModifiableArtifactModel) -> CommitSummary {
        let _guard = CommitGuard::enter(&self.inside_commit);

        let (events, summary) = {
            let mut live = self.live.write();
            if model.base_modification_count != live.modification_count {
                warn!(
                    base = model.base_modification_count,
                    live = live.modification_count,
                    "committing a model created before the last commit"
                );
            }

            let ModifiableArtifactModel {
                order, mut copies, ..
            } = model;
            let new_handles: HashSet<ArtifactHandle> = order.iter().copied().collect();

            let mut removed = Vec::new();
            for handle in &live.order {
                if !new_handles.contains(handle) {
                    if let Some(slot) = live.slots.get(handle) {
                        removed.push(slot.artifact(*handle));
                    }
                }
            }

            let mut added = Vec::new();
            let mut changed = Vec::new();
            for handle in &order {
                match live.slots.get_mut(handle) {
                    None => {
                        let Some(data) = copies.remove(handle) else {
                            continue;
                        };
                        let slot = Slot {
                            generation: 1,
                            data,
                        };
                        added.push(slot.artifact(*handle));
                        live.slots.insert(*handle, slot);
                    }
                    Some(slot) => {
                        let Some(copy) = copies.remove(handle) else {
                            continue;
                        };
                        if *copy != *slot.data {
                            let old_name = slot.data.name().to_string();
                            slot.data = copy;
                            slot.generation += 1;
                            changed.push((slot.artifact(*handle), old_name));
                        }
                    }
                }
            }

            for artifact in &removed {
                live.slots.remove(&artifact.handle());
            }
            let committed_order: Vec<ArtifactHandle> = order
                .into_iter()
                .filter(|handle| live.slots.contains_key(handle))
                .collect();
            live.order = committed_order;
            live.modification_count += 1;

            let summary = CommitSummary {
                removed: removed.iter().map(|a| a.name().to_string()).collect(),
                added: added.iter().map(|a| a.name().to_string()).collect(),
                changed: changed
                    .iter()
                    .map(|(a, old)| (old.clone(), a.name().to_string()))
                    .collect(),
                modification_count: live.modification_count,
            };

            let events: Vec<ArtifactEvent> = removed
                .into_iter()
                .map(ArtifactEvent::Removed)
                .chain(added.into_iter().map(ArtifactEvent::Added))
                .chain(
                    changed
                        .into_iter()
                        .map(|(artifact, old_name)| ArtifactEvent::Changed { artifact, old_name }),
                )
                .collect();
            (events, summary)
        };

        debug!(
            removed = summary.removed.len(),
            added = summary.added.len(),
            changed = summary.changed.len(),
            modification_count = summary.modification_count,
            "committed artifact model"
        );

        let listeners: Vec<Arc<dyn ArtifactListener>> = self.listeners.read().clone();
        for event in &events {
            for listener in &listeners {
                listener.artifact_event(self, event);
            }
        }
        summary
    }

    /// Replaces the live model with persisted artifacts.
    ///
    /// Artifacts that fail to load become invalid placeholders; the rest load
    /// normally.
    pub fn load(&self, states: Vec<ArtifactState>) -> LoadReport {
        let mut model = self.create_modifiable_model();
        for handle in model.order.clone() {
            model.remove_artifact(handle);
        }

        let mut report = LoadReport::default();
        for artifact_state in states {
            let data =
                state::load_artifact_or_invalid(artifact_state, &self.element_types, &self.artifact_types);
            match data.invalid_info() {
                Some(invalid) => {
                    warn!(artifact = %data.name(), reason = %invalid.message, "artifact could not be loaded");
                    report.invalid.push((data.name().to_string(), invalid.message.clone()));
                }
                None => report.valid += 1,
            }
            model.add_loaded(data);
        }
        report.commit = self.commit(model);
        report
    }

    /// Persisted state of every artifact, invalid ones included
    pub fn states(&self) -> Vec<ArtifactState> {
        self.snapshot()
            .all_artifacts_including_invalid()
            .iter()
            .map(|artifact| state::save_artifact(artifact))
            .collect()
    }

    /// Sorting data for the current modification count
    pub fn sorting(&self) -> Arc<SortedArtifacts> {
        let snapshot = self.snapshot();
        self.sorting.get_or_compute(snapshot.modification_count(), || {
            SortedArtifacts::compute(&ArtifactGraph::build(&snapshot))
        })
    }

    /// Artifact names, each embedder before the artifacts it embeds
    pub fn sorted_artifact_names(&self) -> Vec<String> {
        self.sorting().sorted_names().to_vec()
    }

    /// Self-including artifacts mapped to a representative cycle member
    pub fn self_including_artifacts(&self) -> HashMap<String, String> {
        self.sorting().self_including().clone()
    }

    /// Valid artifacts in build order: embedded artifacts first
    pub fn artifacts_sorted_by_inclusion(&self) -> Vec<Artifact> {
        let snapshot = self.snapshot();
        let sorting = self.sorting();
        sorting
            .build_order()
            .iter()
            .filter_map(|name| snapshot.find_artifact(name))
            .collect()
    }
}

/// Immutable view of the live model at one modification count
#[derive(Clone)]
pub struct ModelSnapshot {
    artifacts: Arc<Vec<Artifact>>,
    modification_count: u64,
    structure: Arc<ProjectStructure>,
    artifact_types: Arc<ArtifactTypeRegistry>,
}

impl ModelSnapshot {
    pub fn modification_count(&self) -> u64 {
        self.modification_count
    }

    /// Valid artifact with exactly this name
    pub fn find_artifact(&self, name: &str) -> Option<Artifact> {
        self.artifacts
            .iter()
            .find(|a| a.is_valid() && a.name() == name)
            .cloned()
    }

    pub fn find_including_invalid(&self, name: &str) -> Option<Artifact> {
        self.artifacts.iter().find(|a| a.name() == name).cloned()
    }
}

impl ArtifactModel for ModelSnapshot {
    fn all_artifacts_including_invalid(&self) -> Vec<Artifact> {
        self.artifacts.as_ref().clone()
    }

    fn find_artifact(&self, name: &str) -> Option<Artifact> {
        ModelSnapshot::find_artifact(self, name)
    }
}

impl ResolvingContext for ModelSnapshot {
    fn artifact_model(&self) -> &dyn ArtifactModel {
        self
    }

    fn artifact_types(&self) -> &ArtifactTypeRegistry {
        &self.artifact_types
    }

    fn structure(&self) -> &ProjectStructure {
        &self.structure
    }
}

/// Private, copy-on-write working copy of the artifact set
pub struct ModifiableArtifactModel {
    base_modification_count: u64,
    order: Vec<ArtifactHandle>,
    original_order: Vec<ArtifactHandle>,
    originals: HashMap<ArtifactHandle, Slot>,
    copies: HashMap<ArtifactHandle, Arc<ArtifactData>>,
    next_handle: Arc<AtomicU64>,
    structure: Arc<ProjectStructure>,
    artifact_types: Arc<ArtifactTypeRegistry>,
}

impl ModifiableArtifactModel {
    fn current(&self, handle: ArtifactHandle) -> Option<Artifact> {
        let generation = self.originals.get(&handle).map_or(0, |slot| slot.generation);
        match self.copies.get(&handle) {
            Some(copy) => Some(Artifact::new(handle, generation, Arc::clone(copy))),
            None => self.originals.get(&handle).map(|slot| slot.artifact(handle)),
        }
    }

    /// Returns the artifact behind `handle` as seen by this model
    pub fn get(&self, handle: ArtifactHandle) -> Option<Artifact> {
        if !self.order.contains(&handle) {
            return None;
        }
        self.current(handle)
    }

    /// Valid artifact with exactly this name
    pub fn find_artifact(&self, name: &str) -> Option<Artifact> {
        ArtifactModel::find_artifact(self, name)
    }

    pub fn find_including_invalid(&self, name: &str) -> Option<Artifact> {
        self.all_artifacts_including_invalid()
            .into_iter()
            .find(|a| a.name() == name)
    }

    /// Returns `base`, or `base2`, `base3`, ... for the first unused name
    pub fn generate_unique_name(&self, base: &str) -> String {
        let mut name = base.to_string();
        let mut i = 2;
        while self.find_artifact(&name).is_some() {
            name = format!("{}{}", base, i);
            i += 1;
        }
        name
    }

    fn allocate_handle(&self) -> ArtifactHandle {
        ArtifactHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds a new artifact with the type's default root
    pub fn add_artifact(&mut self, name: &str, artifact_type: &str) -> Result<ArtifactHandle, ModelError> {
        let create_root = self
            .artifact_types
            .find_by_str(artifact_type)
            .map(|t| t.create_root)
            .ok_or_else(|| ModelError::UnknownArtifactType(artifact_type.to_string()))?;
        let name = self.checked_unique_name(name)?;
        let root = create_root(&name);
        Ok(self.insert(ArtifactData::new(name, ArtifactTypeId::new(artifact_type), root)))
    }

    /// Adds a new artifact with an explicit root tree
    pub fn add_artifact_with_root(
        &mut self,
        name: &str,
        artifact_type: &str,
        root: PackagingTree,
    ) -> Result<ArtifactHandle, ModelError> {
        if self.artifact_types.find_by_str(artifact_type).is_none() {
            return Err(ModelError::UnknownArtifactType(artifact_type.to_string()));
        }
        let name = self.checked_unique_name(name)?;
        Ok(self.insert(ArtifactData::new(name, ArtifactTypeId::new(artifact_type), root)))
    }

    fn checked_unique_name(&self, name: &str) -> Result<String, ModelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        Ok(self.generate_unique_name(name))
    }

    pub(crate) fn add_loaded(&mut self, mut data: ArtifactData) -> ArtifactHandle {
        if data.is_valid() {
            let unique = self.generate_unique_name(data.name());
            if unique != data.name() {
                warn!(artifact = %data.name(), renamed = %unique, "duplicate artifact name");
                data.set_name(unique);
            }
        }
        self.insert(data)
    }

    fn insert(&mut self, data: ArtifactData) -> ArtifactHandle {
        let handle = self.allocate_handle();
        self.copies.insert(handle, Arc::new(data));
        self.order.push(handle);
        handle
    }

    /// Removes an artifact from this model; returns false if it was not present
    pub fn remove_artifact(&mut self, handle: ArtifactHandle) -> bool {
        let before = self.order.len();
        self.order.retain(|h| *h != handle);
        self.copies.remove(&handle);
        self.order.len() != before
    }

    /// Mutable access to an artifact, copying it on first write
    pub fn artifact_mut(&mut self, handle: ArtifactHandle) -> Result<&mut ArtifactData, ModelError> {
        let current = self
            .get(handle)
            .ok_or_else(|| ModelError::ArtifactNotFound(handle.to_string()))?;
        if !current.is_valid() {
            return Err(ModelError::InvalidArtifact(current.name().to_string()));
        }
        let copy = self
            .copies
            .entry(handle)
            .or_insert_with(|| Arc::clone(current.data()));
        Ok(Arc::make_mut(copy))
    }

    /// Renames an artifact, keeping names unique among valid artifacts
    pub fn rename(&mut self, handle: ArtifactHandle, new_name: &str) -> Result<(), ModelError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        if let Some(existing) = self.find_artifact(new_name) {
            if existing.handle() != handle {
                return Err(ModelError::DuplicateName(new_name.to_string()));
            }
        }
        self.artifact_mut(handle)?.set_name(new_name);
        Ok(())
    }

    /// Live data of the artifact when this model was created
    pub fn original_of(&self, handle: ArtifactHandle) -> Option<Artifact> {
        self.originals.get(&handle).map(|slot| slot.artifact(handle))
    }

    /// The private copy of an artifact, if it was edited or added here
    pub fn modifiable_copy(&self, handle: ArtifactHandle) -> Option<Artifact> {
        self.copies.get(&handle).and_then(|_| self.current(handle))
    }

    /// True if committing would change the live model
    pub fn is_modified(&self) -> bool {
        self.order != self.original_order
            || self.copies.iter().any(|(handle, copy)| {
                self.originals
                    .get(handle)
                    .map_or(true, |slot| *slot.data != **copy)
            })
    }

    /// Removes invalid artifacts (all, or the one named); returns their names
    pub fn discard_invalid(&mut self, name: Option<&str>) -> Vec<String> {
        let targets: Vec<Artifact> = self
            .all_artifacts_including_invalid()
            .into_iter()
            .filter(|a| !a.is_valid() && name.map_or(true, |n| a.name() == n))
            .collect();
        for artifact in &targets {
            self.remove_artifact(artifact.handle());
        }
        targets.iter().map(|a| a.name().to_string()).collect()
    }
}

impl ArtifactModel for ModifiableArtifactModel {
    fn all_artifacts_including_invalid(&self) -> Vec<Artifact> {
        self.order.iter().filter_map(|h| self.current(*h)).collect()
    }
}

impl ResolvingContext for ModifiableArtifactModel {
    fn artifact_model(&self) -> &dyn ArtifactModel {
        self
    }

    fn artifact_types(&self) -> &ArtifactTypeRegistry {
        &self.artifact_types
    }

    fn structure(&self) -> &ProjectStructure {
        &self.structure
    }
}
