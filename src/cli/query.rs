//! Query commands (order, cycles, layout, which, source)
//!
//! Read-only views over the artifact model.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use tracing::debug;

use super::artifact_cmd::{open_model, require_artifact};
use super::output::Output;
use crate::domain::util::{self, LayoutEntry};
use crate::domain::ArtifactModel;

/// Show artifacts in build order
pub fn order(output: &Output) -> Result<()> {
    let (_, manager) = open_model()?;
    let sorting = manager.sorting();
    let order = sorting.build_order();
    let self_including: BTreeMap<_, _> = sorting.self_including().iter().collect();

    if output.is_json() {
        output.data(&serde_json::json!({
            "order": order,
            "self_including": self_including,
        }));
        return Ok(());
    }

    if order.is_empty() {
        println!("No artifacts.");
    } else {
        println!("Build order ({}):", order.len());
        for (i, name) in order.iter().enumerate() {
            println!("{:>4}. {}", i + 1, name);
        }
    }
    for (name, representative) in self_including {
        if name == representative {
            output.warning(&format!("'{}' includes itself", name));
        } else {
            output.warning(&format!(
                "'{}' includes itself through '{}'",
                name, representative
            ));
        }
    }
    Ok(())
}

/// Show groups of artifacts that include each other
pub fn cycles(output: &Output) -> Result<()> {
    let (_, manager) = open_model()?;
    let sorting = manager.sorting();
    let cycles = sorting.cycles();

    let mut self_loops: Vec<&String> = sorting
        .self_including()
        .iter()
        .filter(|(name, representative)| {
            name == representative && !cycles.iter().any(|c| c.contains(*name))
        })
        .map(|(name, _)| name)
        .collect();
    self_loops.sort();

    if output.is_json() {
        output.data(&serde_json::json!({
            "cycles": cycles,
            "self_loops": self_loops,
        }));
    } else if cycles.is_empty() && self_loops.is_empty() {
        println!("No cycles.");
    } else {
        for cycle in cycles {
            println!("cycle: {}", cycle.join(" <-> "));
        }
        for name in self_loops {
            println!("self:  {}", name);
        }
    }
    Ok(())
}

/// Show the output paths an artifact produces
pub fn layout(output: &Output, artifact_name: &str) -> Result<()> {
    let (_, manager) = open_model()?;
    let snapshot = manager.snapshot();
    let artifact = require_artifact(&snapshot, artifact_name)?;
    let entries: Vec<LayoutEntry> = util::artifact_layout(&artifact, &snapshot);
    debug!(artifact = %artifact_name, entries = entries.len(), "computed layout");

    if output.is_json() {
        output.data(&serde_json::json!({
            "artifact": artifact.name(),
            "output": artifact.output_file_path(),
            "entries": entries,
        }));
        return Ok(());
    }

    println!(
        "{} -> {}",
        artifact.name(),
        artifact.output_file_path().as_deref().unwrap_or("(no output path)")
    );
    if entries.is_empty() {
        println!("  (empty)");
    }
    let width = entries
        .iter()
        .map(|e| e.output_path.len())
        .max()
        .unwrap_or(0)
        .max(1);
    for entry in &entries {
        let path = if entry.output_path.is_empty() {
            "."
        } else {
            entry.output_path.as_str()
        };
        println!("  {:<width$}  <- {}", path, entry.source, width = width);
    }
    Ok(())
}

/// Find artifacts that package a file
pub fn which(output: &Output, file: &str) -> Result<()> {
    let (_, manager) = open_model()?;
    let snapshot = manager.snapshot();
    let artifacts = snapshot.artifacts();
    let found = util::find_containing_artifacts_with_output_paths(file, &artifacts, &snapshot);

    if output.is_json() {
        let items: Vec<_> = found
            .iter()
            .map(|c| {
                serde_json::json!({
                    "artifact": c.artifact.name(),
                    "output_path": c.output_path(),
                })
            })
            .collect();
        output.data(&items);
    } else if found.is_empty() {
        println!("No artifact packages '{}'.", file);
    } else {
        for containing in &found {
            println!("{:<24} {}", containing.artifact.name(), containing.output_path());
        }
    }
    Ok(())
}

/// Find the source files behind an output path of an artifact
pub fn source(output: &Output, artifact_name: &str, output_path: &str) -> Result<()> {
    let (project, manager) = open_model()?;
    let snapshot = manager.snapshot();
    let artifact = require_artifact(&snapshot, artifact_name)?;

    // Paths printed by `layout` start with an archive root's name
    let root_name = artifact.root_element().composite_name().unwrap_or_default();
    let trimmed = util::trim_forward_slashes(output_path);
    let relative = match trimmed.strip_prefix(root_name) {
        Some(rest) if !root_name.is_empty() && rest.starts_with('/') => rest,
        _ => trimmed,
    };

    let candidates = util::find_source_files_by_output_path(
        &artifact.root_ref(),
        relative,
        &snapshot,
        artifact.artifact_type(),
    );
    let exists = |candidate: &str| {
        let file = candidate.split("!/").next().unwrap_or(candidate);
        let path = Path::new(file);
        if path.is_absolute() {
            path.exists()
        } else {
            project.root().join(path).exists()
        }
    };

    if output.is_json() {
        let items: Vec<_> = candidates
            .iter()
            .map(|c| {
                serde_json::json!({
                    "path": c,
                    "exists": exists(c),
                })
            })
            .collect();
        output.data(&items);
    } else if candidates.is_empty() {
        println!("Nothing in '{}' produces '{}'.", artifact_name, output_path);
    } else {
        for candidate in &candidates {
            let marker = if exists(candidate) { "" } else { "  (missing)" };
            println!("{}{}", candidate, marker);
        }
    }
    Ok(())
}
