//! Stable references to artifacts by name
//!
//! A pointer survives renames and removal: it follows the artifact when it is
//! renamed, loses its target when the artifact is removed and binds again
//! when an artifact with its name is added.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::artifact::{Artifact, ArtifactHandle};
use super::model::{ArtifactEvent, ArtifactListener, ArtifactManager};

#[derive(Debug)]
struct PointerState {
    name: String,
    handle: Option<ArtifactHandle>,
}

/// Shared reference to an artifact; clones point at the same target
#[derive(Debug, Clone)]
pub struct ArtifactPointer {
    state: Arc<RwLock<PointerState>>,
}

impl ArtifactPointer {
    fn new(name: &str, handle: Option<ArtifactHandle>) -> Self {
        Self {
            state: Arc::new(RwLock::new(PointerState {
                name: name.to_string(),
                handle,
            })),
        }
    }

    /// Name of the artifact this pointer tracks
    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn handle(&self) -> Option<ArtifactHandle> {
        self.state.read().handle
    }

    /// Resolves the pointer against the live model
    pub fn find_artifact(&self, manager: &ArtifactManager) -> Option<Artifact> {
        let state = self.state.read();
        match state.handle {
            Some(handle) => manager.artifact(handle),
            None => manager.find_artifact(&state.name),
        }
    }
}

impl PartialEq for ArtifactPointer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Hands out one pointer per artifact name and keeps them current
#[derive(Debug, Default)]
pub struct ArtifactPointerManager {
    pointers: Mutex<HashMap<String, ArtifactPointer>>,
}

impl ArtifactPointerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer for the artifact called `name`, bound if it exists
    pub fn create_pointer(&self, manager: &ArtifactManager, name: &str) -> ArtifactPointer {
        self.pointers
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| {
                ArtifactPointer::new(name, manager.find_artifact(name).map(|a| a.handle()))
            })
            .clone()
    }

    /// Pointer bound to `artifact`
    pub fn pointer_for(&self, artifact: &Artifact) -> ArtifactPointer {
        let mut pointers = self.pointers.lock();
        let pointer = pointers
            .entry(artifact.name().to_string())
            .or_insert_with(|| ArtifactPointer::new(artifact.name(), Some(artifact.handle())));
        pointer.state.write().handle = Some(artifact.handle());
        pointer.clone()
    }

    pub fn len(&self) -> usize {
        self.pointers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.lock().is_empty()
    }
}

impl ArtifactListener for ArtifactPointerManager {
    fn artifact_event(&self, _manager: &ArtifactManager, event: &ArtifactEvent) {
        let mut pointers = self.pointers.lock();
        match event {
            ArtifactEvent::Removed(artifact) => {
                if let Some(pointer) = pointers.get(artifact.name()) {
                    let mut state = pointer.state.write();
                    if state.handle == Some(artifact.handle()) {
                        state.handle = None;
                    }
                }
            }
            ArtifactEvent::Added(artifact) => {
                if let Some(pointer) = pointers.get(artifact.name()) {
                    pointer.state.write().handle = Some(artifact.handle());
                }
            }
            ArtifactEvent::Changed { artifact, old_name } => {
                if old_name == artifact.name() {
                    return;
                }
                if let Some(pointer) = pointers.remove(old_name) {
                    {
                        let mut state = pointer.state.write();
                        state.name = artifact.name().to_string();
                        state.handle = Some(artifact.handle());
                    }
                    trace!(from = %old_name, to = %artifact.name(), "artifact pointer renamed");
                    pointers.insert(artifact.name().to_string(), pointer);
                }
            }
        }
    }
}
