//! Engine tests over generated artifact graphs
//!
//! Exercises ordering, cycle detection, traversal and commits through the
//! public library API.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use packsmith::domain::util::{artifact_layout, LayoutSource};
use packsmith::domain::{
    ArtifactEvent, ArtifactHandle, ArtifactListener, ArtifactManager, ArtifactModel, ArtifactPointerManager,
    ArtifactState, PackagingElement, ProjectStructure,
};

fn name(i: usize) -> String {
    format!("n{}", i)
}

/// Builds a manager with `n` plain artifacts; `(a, b)` means `a` embeds `b`.
/// References go to the artifact root when `a + b` is even and below
/// `lib<b>/` otherwise.
fn manager_with_edges(n: usize, edges: &[(usize, usize)], reverse_insert: bool) -> ArtifactManager {
    let manager = ArtifactManager::with_builtin_types(ProjectStructure::default());
    let mut model = manager.create_modifiable_model();

    let mut handles: Vec<Option<ArtifactHandle>> = vec![None; n];
    let order: Vec<usize> = if reverse_insert {
        (0..n).rev().collect()
    } else {
        (0..n).collect()
    };
    for i in order {
        handles[i] = Some(model.add_artifact(&name(i), "plain").unwrap());
    }

    for (from, to) in edges {
        let tree = model.artifact_mut(handles[*from].unwrap()).unwrap().root_mut();
        let root = tree.root();
        let parent = if (from + to) % 2 == 0 {
            root
        } else {
            tree.get_or_create_directory(root, &format!("lib{}", to)).unwrap()
        };
        tree.add_or_find_child(parent, PackagingElement::artifact(name(*to))).unwrap();
    }
    manager.commit(model);
    manager
}

/// `reach[a][b]`: a path of length >= 1 leads from `a` to `b`
fn reachability(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<bool>> {
    let mut reach = vec![vec![false; n]; n];
    for (a, b) in edges {
        reach[*a][*b] = true;
    }
    for k in 0..n {
        for i in 0..n {
            for j in 0..n {
                if reach[i][k] && reach[k][j] {
                    reach[i][j] = true;
                }
            }
        }
    }
    reach
}

fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..8).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..16)))
}

proptest! {
    #[test]
    fn embedders_precede_embedded_artifacts((n, edges) in graph_strategy()) {
        let manager = manager_with_edges(n, &edges, false);
        let sorted = manager.sorted_artifact_names();
        let reach = reachability(n, &edges);

        prop_assert_eq!(sorted.len(), n);
        let position: HashMap<&str, usize> =
            sorted.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();

        for (a, b) in &edges {
            if a != b && !reach[*b][*a] {
                prop_assert!(position[name(*a).as_str()] < position[name(*b).as_str()]);
            }
        }
    }

    #[test]
    fn self_including_matches_reachability((n, edges) in graph_strategy()) {
        let manager = manager_with_edges(n, &edges, false);
        let flagged = manager.self_including_artifacts();
        let reach = reachability(n, &edges);
        let on_cycle = |i: usize| reach[i][i];

        for x in 0..n {
            let expected = on_cycle(x) || (0..n).any(|c| reach[x][c] && on_cycle(c));
            prop_assert_eq!(flagged.contains_key(&name(x)), expected);
        }
        for representative in flagged.values() {
            let index: usize = representative[1..].parse().unwrap();
            prop_assert!(on_cycle(index));
        }
    }

    #[test]
    fn cycles_group_mutually_reachable_artifacts((n, edges) in graph_strategy()) {
        let manager = manager_with_edges(n, &edges, false);
        let sorting = manager.sorting();
        let reach = reachability(n, &edges);

        for cycle in sorting.cycles() {
            prop_assert!(cycle.len() > 1);
            for a in cycle {
                for b in cycle {
                    let (a, b): (usize, usize) = (a[1..].parse().unwrap(), b[1..].parse().unwrap());
                    prop_assert!(reach[a][b]);
                }
            }
        }
        for i in 0..n {
            let in_group = (0..n).any(|j| j != i && reach[i][j] && reach[j][i]);
            let listed = sorting.cycles().iter().any(|c| c.contains(&name(i)));
            prop_assert_eq!(in_group, listed);
        }
    }

    #[test]
    fn ordering_ignores_insertion_order((n, edges) in graph_strategy()) {
        let forward = manager_with_edges(n, &edges, false);
        let backward = manager_with_edges(n, &edges, true);

        prop_assert_eq!(forward.sorted_artifact_names(), backward.sorted_artifact_names());
        prop_assert_eq!(forward.self_including_artifacts(), backward.self_including_artifacts());
    }

    #[test]
    fn layout_terminates_and_marks_cycles((n, edges) in graph_strategy()) {
        let manager = manager_with_edges(n, &edges, false);
        let snapshot = manager.snapshot();
        let reach = reachability(n, &edges);

        for i in 0..n {
            let artifact = snapshot.find_artifact(&name(i)).unwrap();
            let entries = artifact_layout(&artifact, &snapshot);
            let cyclic = entries
                .iter()
                .any(|e| matches!(e.source, LayoutSource::Cyclic { .. }));
            // An artifact that reaches a cycle lays out a cyclic reference
            let reaches_cycle = (0..n).any(|c| (c == i || reach[i][c]) && reach[c][c]);
            prop_assert_eq!(cyclic, reaches_cycle);
        }
    }
}

// =============================================================================
// Commit engine
// =============================================================================

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(String, String)>>,
}

impl ArtifactListener for Recorder {
    fn artifact_event(&self, _manager: &ArtifactManager, event: &ArtifactEvent) {
        self.events
            .lock()
            .push((event.kind().to_string(), event.artifact().name().to_string()));
    }
}

#[test]
fn commit_publishes_removed_then_added_then_changed() {
    let manager = ArtifactManager::with_builtin_types(ProjectStructure::default());
    let mut model = manager.create_modifiable_model();
    let a = model.add_artifact("A", "plain").unwrap();
    let b = model.add_artifact("B", "plain").unwrap();
    let c = model.add_artifact("C", "zip").unwrap();
    manager.commit(model);

    let recorder = Arc::new(Recorder::default());
    manager.add_listener(recorder.clone());

    let mut model = manager.create_modifiable_model();
    model.rename(c, "C2").unwrap();
    model.add_artifact("D", "plain").unwrap();
    let tree = model.artifact_mut(b).unwrap().root_mut();
    let root = tree.root();
    tree.add_child(root, PackagingElement::file_copy("x.txt")).unwrap();
    model.remove_artifact(a);
    let summary = manager.commit(model);

    let events = recorder.events.lock().clone();
    let kinds: Vec<&str> = events.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(kinds, vec!["removed", "added", "changed", "changed"]);
    assert_eq!(events[0].1, "A");
    assert_eq!(events[1].1, "D");
    assert_eq!(summary.changed, vec![("B".to_string(), "B".to_string()), ("C".to_string(), "C2".to_string())]);
}

#[test]
fn uncommitted_edits_are_invisible() {
    let manager = ArtifactManager::with_builtin_types(ProjectStructure::default());
    let mut model = manager.create_modifiable_model();
    let app = model.add_artifact("App", "plain").unwrap();
    manager.commit(model);
    let before = manager.snapshot();

    let mut model = manager.create_modifiable_model();
    let tree = model.artifact_mut(app).unwrap().root_mut();
    let root = tree.root();
    tree.add_child(root, PackagingElement::directory("lib")).unwrap();
    assert!(model.is_modified());
    assert!(manager.find_artifact("App").unwrap().root_tree().is_empty());
    drop(model);

    assert_eq!(manager.modification_count(), before.modification_count());
    assert!(manager.find_artifact("App").unwrap().root_tree().is_empty());
}

#[test]
fn invalid_artifacts_load_and_save_unchanged() {
    let states: Vec<ArtifactState> = [
        r#"{"name":"Web","type":"plain","root":{"id":"root","children":[{"id":"directory","name":"static"}]}}"#,
        r#"{"name":"Legacy","type":"plain","root":{"id":"root","children":[{"id":"javaee-facet","facet":"web"}]}}"#,
        r#"{"name":"Dist","type":"zip","output_path":"out/dist","root":{"id":"archive","name":"Dist.zip"}}"#,
    ]
    .iter()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();

    let manager = ArtifactManager::with_builtin_types(ProjectStructure::default());
    let report = manager.load(states.clone());

    assert_eq!(report.valid, 2);
    assert_eq!(report.invalid.len(), 1);
    assert_eq!(report.invalid[0].0, "Legacy");
    assert_eq!(manager.snapshot().artifacts().len(), 2);
    assert_eq!(manager.states(), states);
}

#[test]
fn app_embedding_lib_builds_lib_first() {
    let manager = ArtifactManager::with_builtin_types(ProjectStructure::default());
    let mut model = manager.create_modifiable_model();
    let app = model.add_artifact("App", "plain").unwrap();
    model.add_artifact("Lib", "zip").unwrap();
    let tree = model.artifact_mut(app).unwrap().root_mut();
    let root = tree.root();
    let lib_dir = tree.get_or_create_directory(root, "lib").unwrap();
    tree.add_child(lib_dir, PackagingElement::artifact("Lib")).unwrap();
    manager.commit(model);

    let names: Vec<String> = manager
        .artifacts_sorted_by_inclusion()
        .iter()
        .map(|a| a.name().to_string())
        .collect();
    assert_eq!(names, vec!["Lib", "App"]);
    assert!(manager.self_including_artifacts().is_empty());

    let snapshot = manager.snapshot();
    let app = snapshot.find_artifact("App").unwrap();
    let entries = artifact_layout(&app, &snapshot);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].output_path, "lib/Lib.zip");
    assert_eq!(entries[0].source, LayoutSource::Empty);
}

#[test]
fn pointers_follow_renames_across_commits() {
    let manager = ArtifactManager::with_builtin_types(ProjectStructure::default());
    let pointers = Arc::new(ArtifactPointerManager::new());
    manager.add_listener(pointers.clone());

    let mut model = manager.create_modifiable_model();
    let handle = model.add_artifact("Lib", "plain").unwrap();
    manager.commit(model);
    let pointer = pointers.create_pointer(&manager, "Lib");

    let mut model = manager.create_modifiable_model();
    model.rename(handle, "Core").unwrap();
    manager.commit(model);

    assert_eq!(pointer.name(), "Core");
    assert_eq!(pointer.find_artifact(&manager).unwrap().name(), "Core");
}
