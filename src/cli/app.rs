//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::output::{Output, OutputFormat};
use super::{artifact_cmd, element_cmd, query};
use crate::storage::{Config, Project};

/// Environment variable holding a log filter directive
pub const LOG_ENV: &str = "PACKSMITH_LOG";

#[derive(Parser)]
#[command(name = "packsmith")]
#[command(author, version, about = "Describe, check and inspect build artifact layouts")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log line format on stderr
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new packsmith project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage artifacts
    #[command(subcommand)]
    Artifact(artifact_cmd::ArtifactCommands),

    /// Edit the element tree of an artifact
    #[command(subcommand)]
    Element(element_cmd::ElementCommands),

    /// Show artifacts in build order
    Order,

    /// Show groups of artifacts that include each other
    Cycles,

    /// Show the output paths an artifact produces and their sources
    Layout {
        /// Artifact name
        artifact: String,
    },

    /// Find artifacts that package a file
    Which {
        /// Source file path, as referenced by elements
        file: String,
    },

    /// Find the source files behind an output path of an artifact
    Source {
        /// Artifact name
        artifact: String,

        /// Path inside the artifact output
        output_path: String,
    },
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let global = Config::load_global()?;

    init_logging(cli.verbose, cli.log_format, global.log_filter.as_deref());

    let format = cli.format.unwrap_or_else(|| global.default_format.into());
    let output = Output::new(format);

    match cli.command {
        Commands::Init { path } => {
            debug!(path = %path, "initializing project");
            let project = Project::init(&path)?;
            if output.is_json() {
                output.data(&serde_json::json!({
                    "initialized": true,
                    "root": project.root().display().to_string(),
                }));
            } else {
                output.success(&format!(
                    "Initialized packsmith project at {}",
                    project.root().display()
                ));
            }
        }

        Commands::Artifact(cmd) => artifact_cmd::run(cmd, &output)?,
        Commands::Element(cmd) => element_cmd::run(cmd, &output)?,

        Commands::Order => query::order(&output)?,
        Commands::Cycles => query::cycles(&output)?,
        Commands::Layout { artifact } => query::layout(&output, &artifact)?,
        Commands::Which { file } => query::which(&output, &file)?,
        Commands::Source {
            artifact,
            output_path,
        } => query::source(&output, &artifact, &output_path)?,
    }

    debug!("command completed");
    Ok(())
}

/// Picks the log filter: `--verbose`, then `PACKSMITH_LOG`, then the global
/// config, then `warn`
fn log_filter(verbose: bool, configured: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return filter;
    }
    configured
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Initializes the tracing subscriber on stderr
fn init_logging(verbose: bool, format: LogFormat, configured: Option<&str>) {
    let filter = log_filter(verbose, configured);

    // A subscriber may already be installed when running inside tests
    let _ = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
}
