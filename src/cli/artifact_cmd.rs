//! Artifact commands

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::debug;

use super::output::Output;
use crate::domain::state::save_artifact;
use crate::domain::{
    Artifact, ArtifactManager, ArtifactModel, ArtifactTypeRegistry, CommitSummary, ElementRef, ModelError,
    ModifiableArtifactModel,
};
use crate::storage::Project;

#[derive(Subcommand)]
pub enum ArtifactCommands {
    /// Create a new artifact
    New {
        /// Artifact name (made unique if taken)
        name: String,

        /// Artifact type (defaults to the project config)
        #[arg(long = "type", short = 't')]
        artifact_type: Option<String>,

        /// Output directory (defaults to <output_dir>/artifacts/<name>)
        #[arg(long)]
        output_path: Option<String>,

        /// Build the artifact on make
        #[arg(long)]
        build_on_make: bool,
    },

    /// List artifacts, including ones that failed to load
    List,

    /// Show an artifact and its element tree
    Show {
        /// Artifact name
        name: String,
    },

    /// Remove an artifact
    Remove {
        /// Artifact name
        name: String,
    },

    /// Rename an artifact
    Rename {
        /// Current name
        name: String,

        /// New name
        new_name: String,
    },

    /// Remove artifacts that failed to load
    DiscardInvalid {
        /// Only discard this artifact
        name: Option<String>,
    },

    /// List the registered artifact types
    Types,
}

pub fn run(cmd: ArtifactCommands, output: &Output) -> Result<()> {
    match cmd {
        ArtifactCommands::New {
            name,
            artifact_type,
            output_path,
            build_on_make,
        } => new(output, &name, artifact_type, output_path, build_on_make),
        ArtifactCommands::List => list(output),
        ArtifactCommands::Show { name } => show(output, &name),
        ArtifactCommands::Remove { name } => remove(output, &name),
        ArtifactCommands::Rename { name, new_name } => rename(output, &name, &new_name),
        ArtifactCommands::DiscardInvalid { name } => discard_invalid(output, name.as_deref()),
        ArtifactCommands::Types => types(output),
    }
}

/// Opens the current project and loads its artifacts
pub(super) fn open_model() -> Result<(Project, ArtifactManager)> {
    let project = Project::open_current()?;
    debug!(root = %project.root().display(), "opened project");
    let (manager, report) = project.load_artifacts()?;
    for (name, reason) in &report.invalid {
        debug!(artifact = %name, reason = %reason, "invalid artifact");
    }
    Ok((project, manager))
}

/// Commits `model` and persists the result
pub(super) fn commit_and_save(
    project: &Project,
    manager: &ArtifactManager,
    model: ModifiableArtifactModel,
) -> Result<CommitSummary> {
    let summary = manager.commit(model);
    project.save_artifacts(manager)?;
    Ok(summary)
}

/// Finds a valid artifact or fails with a user-facing error
pub(super) fn require_artifact(model: &impl ArtifactModel, name: &str) -> Result<Artifact> {
    model
        .find_artifact(name)
        .ok_or_else(|| ModelError::ArtifactNotFound(name.to_string()).into())
}

fn new(
    output: &Output,
    name: &str,
    artifact_type: Option<String>,
    output_path: Option<String>,
    build_on_make: bool,
) -> Result<()> {
    let (project, manager) = open_model()?;
    let config = project.config();
    let artifact_type = artifact_type.unwrap_or_else(|| config.project.default_artifact_type.clone());

    let mut model = manager.create_modifiable_model();
    let handle = model.add_artifact(name, &artifact_type)?;
    let created = model
        .get(handle)
        .map(|a| a.name().to_string())
        .unwrap_or_else(|| name.to_string());

    let output_path = match output_path {
        Some(path) => Some(path),
        None => manager
            .artifact_types()
            .find_by_str(&artifact_type)
            .zip(config.output_root())
            .map(|(t, root)| (t.default_output_path)(&created, &root.to_string_lossy())),
    };
    let data = model.artifact_mut(handle)?;
    data.set_output_path(output_path.clone());
    data.set_build_on_make(build_on_make || config.project.build_on_make);

    commit_and_save(&project, &manager, model)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "name": created,
            "type": artifact_type,
            "output_path": output_path,
        }));
    } else {
        output.success(&format!("Created artifact '{}' ({})", created, artifact_type));
        if created != name.trim() {
            println!("  '{}' was taken", name.trim());
        }
    }
    Ok(())
}

fn list(output: &Output) -> Result<()> {
    let (_, manager) = open_model()?;
    let artifacts = manager.snapshot().all_artifacts_including_invalid();

    if output.is_json() {
        let items: Vec<_> = artifacts
            .iter()
            .map(|a| {
                serde_json::json!({
                    "name": a.name(),
                    "type": a.artifact_type().as_str(),
                    "output_path": a.output_path(),
                    "build_on_make": a.build_on_make(),
                    "valid": a.is_valid(),
                    "problem": a.invalid_info().map(|i| i.message.as_str()),
                })
            })
            .collect();
        output.data(&items);
    } else if artifacts.is_empty() {
        println!("No artifacts.");
    } else {
        println!("{:<24} {:<10} OUTPUT", "NAME", "TYPE");
        println!("{}", "-".repeat(70));
        for artifact in &artifacts {
            match artifact.invalid_info() {
                Some(invalid) => println!(
                    "{:<24} {:<10} INVALID: {}",
                    artifact.name(),
                    invalid.state.artifact_type,
                    invalid.message
                ),
                None => println!(
                    "{:<24} {:<10} {}",
                    artifact.name(),
                    artifact.artifact_type().as_str(),
                    artifact.output_path().unwrap_or("-")
                ),
            }
        }
    }
    Ok(())
}

fn show(output: &Output, name: &str) -> Result<()> {
    let (_, manager) = open_model()?;
    let snapshot = manager.snapshot();
    let artifact = snapshot
        .find_including_invalid(name)
        .ok_or_else(|| ModelError::ArtifactNotFound(name.to_string()))?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "valid": artifact.is_valid(),
            "problem": artifact.invalid_info().map(|i| i.message.as_str()),
            "output_file_path": artifact.output_file_path(),
            "artifact": save_artifact(&artifact),
        }));
        return Ok(());
    }

    println!("Artifact: {}", artifact.name());
    if let Some(invalid) = artifact.invalid_info() {
        println!("Type:     {} (not loaded)", invalid.state.artifact_type);
        println!("Problem:  {}", invalid.message);
        return Ok(());
    }
    println!("Type:     {}", artifact.artifact_type());
    println!("Output:   {}", artifact.output_file_path().as_deref().unwrap_or("-"));
    println!("Build on make: {}", if artifact.build_on_make() { "yes" } else { "no" });
    println!();
    print_tree(&artifact.root_ref(), 0);
    Ok(())
}

fn print_tree(element: &ElementRef, depth: usize) {
    println!("{}{}", "  ".repeat(depth), element.element());
    for child in element.children() {
        print_tree(&child, depth + 1);
    }
}

fn remove(output: &Output, name: &str) -> Result<()> {
    let (project, manager) = open_model()?;
    let mut model = manager.create_modifiable_model();
    let artifact = model
        .find_including_invalid(name)
        .ok_or_else(|| ModelError::ArtifactNotFound(name.to_string()))?;
    model.remove_artifact(artifact.handle());
    commit_and_save(&project, &manager, model)?;

    let remaining_references = embedders_of(&manager, name);

    if output.is_json() {
        output.data(&serde_json::json!({
            "removed": name,
            "referenced_by": remaining_references,
        }));
    } else {
        output.success(&format!("Removed artifact '{}'", name));
        if remaining_references > 0 {
            output.warning(&format!(
                "{} artifact(s) still embed '{}'; those elements no longer resolve",
                remaining_references, name
            ));
        }
    }
    Ok(())
}

/// Number of valid artifacts whose tree references `name`
fn embedders_of(manager: &ArtifactManager, name: &str) -> usize {
    manager
        .snapshot()
        .artifacts()
        .iter()
        .filter(|a| {
            let tree = a.root_tree();
            tree.descendants(tree.root())
                .iter()
                .any(|id| tree.get(*id).and_then(|e| e.artifact_name()) == Some(name))
        })
        .count()
}

fn rename(output: &Output, name: &str, new_name: &str) -> Result<()> {
    let (project, manager) = open_model()?;
    let mut model = manager.create_modifiable_model();
    let artifact = require_artifact(&model, name)?;
    model
        .rename(artifact.handle(), new_name)
        .with_context(|| format!("Failed to rename '{}'", name))?;
    let summary = commit_and_save(&project, &manager, model)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "renamed": summary.changed.iter().map(|(old, new)| serde_json::json!({
                "from": old,
                "to": new,
            })).collect::<Vec<_>>(),
        }));
    } else {
        output.success(&format!("Renamed '{}' to '{}'", name, new_name.trim()));
        let embedders = embedders_of(&manager, name);
        if embedders > 0 {
            output.warning(&format!(
                "{} artifact(s) still embed '{}' by its old name",
                embedders, name
            ));
        }
    }
    Ok(())
}

fn discard_invalid(output: &Output, name: Option<&str>) -> Result<()> {
    let (project, manager) = open_model()?;
    let mut model = manager.create_modifiable_model();
    let discarded = model.discard_invalid(name);
    if discarded.is_empty() {
        if let Some(name) = name {
            anyhow::bail!("No invalid artifact named '{}'", name);
        }
    }
    commit_and_save(&project, &manager, model)?;

    if output.is_json() {
        output.data(&serde_json::json!({ "discarded": discarded }));
    } else if discarded.is_empty() {
        println!("No invalid artifacts.");
    } else {
        output.success(&format!(
            "Discarded {} invalid artifact(s): {}",
            discarded.len(),
            discarded.join(", ")
        ));
    }
    Ok(())
}

fn types(output: &Output) -> Result<()> {
    let registry = ArtifactTypeRegistry::with_builtin_types();
    let types = registry.all();

    if output.is_json() {
        let items: Vec<_> = types
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id.as_str(),
                    "name": t.presentable_name,
                })
            })
            .collect();
        output.data(&items);
    } else {
        for artifact_type in types {
            println!("{:<12} {}", artifact_type.id.as_str(), artifact_type.presentable_name);
        }
    }
    Ok(())
}
