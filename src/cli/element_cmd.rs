//! Element commands
//!
//! Elements are created from the same `key=value` attributes used in
//! `artifacts.jsonl`, through the element type registry.

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::debug;

use super::artifact_cmd::{commit_and_save, open_model, require_artifact};
use super::output::Output;
use crate::domain::{
    ElementCategory, ElementState, ElementTypeRegistry, PackagingElement, ResolvingContext,
};

#[derive(Subcommand)]
pub enum ElementCommands {
    /// Add an element to an artifact
    Add {
        /// Artifact name
        artifact: String,

        /// Element type id (see 'packsmith element types')
        type_id: String,

        /// Element attributes as key=value
        attributes: Vec<String>,

        /// Directory inside the artifact, created if missing
        #[arg(long)]
        to: Option<String>,
    },

    /// Remove the elements at an output path
    Remove {
        /// Artifact name
        artifact: String,

        /// Path inside the artifact, e.g. lib/app.jar
        output_path: String,
    },

    /// Merge duplicate elements of an artifact
    Dedupe {
        /// Artifact name
        artifact: String,
    },

    /// List element type ids
    Types,
}

pub fn run(cmd: ElementCommands, output: &Output) -> Result<()> {
    match cmd {
        ElementCommands::Add {
            artifact,
            type_id,
            attributes,
            to,
        } => add(output, &artifact, &type_id, &attributes, to.as_deref()),
        ElementCommands::Remove {
            artifact,
            output_path,
        } => remove(output, &artifact, &output_path),
        ElementCommands::Dedupe { artifact } => dedupe(output, &artifact),
        ElementCommands::Types => types(output),
    }
}

/// Parses `key=value` arguments into an element state
fn element_state(type_id: &str, attributes: &[String]) -> Result<ElementState> {
    let mut state = ElementState::new(type_id);
    for attribute in attributes {
        let (key, value) = attribute
            .split_once('=')
            .with_context(|| format!("Expected key=value, got '{}'", attribute))?;
        if key.is_empty() {
            anyhow::bail!("Attribute name cannot be empty in '{}'", attribute);
        }
        state = state.with_attribute(key, value);
    }
    Ok(state)
}

/// Describes a reference the project cannot resolve yet
fn unresolved_reference(element: &PackagingElement, ctx: &dyn ResolvingContext) -> Option<String> {
    match element {
        PackagingElement::Artifact { artifact_name } if ctx.find_artifact(artifact_name).is_none() => {
            Some(format!("artifact '{}' does not exist", artifact_name))
        }
        PackagingElement::ModuleOutput { module_name, .. } if ctx.find_module(module_name).is_none() => {
            Some(format!("module '{}' is not declared in structure.toml", module_name))
        }
        PackagingElement::Library(library) if ctx.find_library(library).is_none() => Some(format!(
            "library '{}' is not declared in structure.toml",
            library.name
        )),
        _ => None,
    }
}

fn add(
    output: &Output,
    artifact_name: &str,
    type_id: &str,
    attributes: &[String],
    to: Option<&str>,
) -> Result<()> {
    let (project, manager) = open_model()?;
    let state = element_state(type_id, attributes)?;
    let element = manager
        .element_types()
        .create(&state)
        .with_context(|| format!("Cannot create '{}' element", type_id))?;

    let mut model = manager.create_modifiable_model();
    let handle = require_artifact(&model, artifact_name)?.handle();
    let warning = unresolved_reference(&element, &model);

    let tree = model.artifact_mut(handle)?.root_mut();
    let root = tree.root();
    let parent = match to {
        Some(path) => tree
            .get_or_create_directory(root, path)
            .with_context(|| format!("Cannot create directory '{}'", path))?,
        None => root,
    };
    tree.add_or_find_child(parent, element.clone())?;
    debug!(artifact = %artifact_name, element = %element, "added element");

    let summary = commit_and_save(&project, &manager, model)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "artifact": artifact_name,
            "element": element.to_string(),
            "changed": !summary.is_empty(),
            "warning": warning,
        }));
    } else {
        if summary.is_empty() {
            output.success(&format!("'{}' already contains {}", artifact_name, element));
        } else {
            output.success(&format!("Added {} to '{}'", element, artifact_name));
        }
        if let Some(warning) = warning {
            output.warning(&warning);
        }
    }
    Ok(())
}

fn remove(output: &Output, artifact_name: &str, output_path: &str) -> Result<()> {
    let (project, manager) = open_model()?;
    let mut model = manager.create_modifiable_model();
    let handle = require_artifact(&model, artifact_name)?.handle();

    let tree = model.artifact_mut(handle)?.root_mut();
    let targets = tree.find_at_path(tree.root(), output_path);
    if targets.is_empty() {
        anyhow::bail!("No element at '{}' in artifact '{}'", output_path, artifact_name);
    }
    let removed: Vec<String> = targets
        .iter()
        .filter_map(|id| tree.get(*id).map(|e| e.to_string()))
        .collect();
    for id in targets {
        tree.remove(id)?;
    }

    commit_and_save(&project, &manager, model)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "artifact": artifact_name,
            "removed": removed,
        }));
    } else {
        for element in &removed {
            output.success(&format!("Removed {} from '{}'", element, artifact_name));
        }
    }
    Ok(())
}

fn dedupe(output: &Output, artifact_name: &str) -> Result<()> {
    let (project, manager) = open_model()?;
    let mut model = manager.create_modifiable_model();
    let handle = require_artifact(&model, artifact_name)?.handle();

    let tree = model.artifact_mut(handle)?.root_mut();
    let before = tree.len();
    let root = tree.root();
    tree.remove_duplicates(root)?;
    let merged = before - tree.len();

    commit_and_save(&project, &manager, model)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "artifact": artifact_name,
            "merged": merged,
        }));
    } else if merged == 0 {
        println!("No duplicate elements in '{}'.", artifact_name);
    } else {
        output.success(&format!("Merged {} duplicate element(s) in '{}'", merged, artifact_name));
    }
    Ok(())
}

fn category_name(category: ElementCategory) -> &'static str {
    match category {
        ElementCategory::Leaf => "leaf",
        ElementCategory::Composite => "composite",
        ElementCategory::Complex => "complex",
    }
}

fn types(output: &Output) -> Result<()> {
    let registry = ElementTypeRegistry::with_builtin_types();

    if output.is_json() {
        let items: Vec<_> = registry
            .all()
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id(),
                    "name": d.element_type.presentable_name(),
                    "category": category_name(d.element_type.category()),
                })
            })
            .collect();
        output.data(&items);
    } else {
        for descriptor in registry.all() {
            println!(
                "{:<14} {:<10} {}",
                descriptor.id(),
                category_name(descriptor.element_type.category()),
                descriptor.element_type.presentable_name()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_attributes() {
        let state = element_state(
            "file-copy",
            &["path=web/index.html".to_string(), "output_name=home.html".to_string()],
        )
        .unwrap();
        assert_eq!(state.type_id, "file-copy");
        assert_eq!(state.attributes["path"], "web/index.html");
        assert_eq!(state.attributes["output_name"], "home.html");
    }

    #[test]
    fn value_may_contain_equals_sign() {
        let state = element_state("directory", &["name=a=b".to_string()]).unwrap();
        assert_eq!(state.attributes["name"], "a=b");
    }

    #[test]
    fn rejects_malformed_attributes() {
        assert!(element_state("directory", &["name".to_string()]).is_err());
        assert!(element_state("directory", &["=x".to_string()]).is_err());
    }
}
