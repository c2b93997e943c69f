//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project management | `init` |
//! | Artifact | Artifact lifecycle | `artifact new`, `artifact list`, `artifact rename` |
//! | Element | Element tree editing | `element add`, `element remove`, `element dedupe` |
//! | Query | Read-only views | `order`, `cycles`, `layout`, `which`, `source` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Logs go to stderr. `--verbose` (or `-v`) enables debug logs; otherwise
//! `PACKSMITH_LOG` or the global `log_filter` setting applies:
//! ```bash
//! PACKSMITH_LOG=packsmith=trace packsmith order
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod artifact_cmd;
mod element_cmd;
mod output;
mod query;

pub use app::{run, Cli, Commands, LogFormat};
pub use output::{Output, OutputFormat};
