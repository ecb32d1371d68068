//! Command-line interface and orchestration for used-by
//!
//! This module parses arguments, loads configuration, assembles pipelines out of the
//! stages, and reports what they did.
//!
//! # Commands
//!
//! - **scan**: Enumerate dependents (live or from a snapshot), keep the relevant ones,
//!   resolve their default branch, download and scan their sources, and write every
//!   call site of the tracked component to a JSON array
//! - **snapshot**: Enumerate dependents once and save them as a JSON array that `scan`
//!   can replay
//! - **report**: Print a link to every call site in a findings file
//! - **init**: Generate a default configuration file
//! - **validate**: Check a configuration file
//!
//! Configuration comes from `used-by.toml` (or `--config`) and is overridden by
//! command-line flags. See `common` for the setup the GitHub-facing commands share.

mod common;
mod config;
mod host;
mod init;
mod progress_reporter;
mod report;
mod run;
mod scan;
mod snapshot;
mod validate;

pub use config::Config;
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use report::{ReportArgs, report};
pub use run::run;
pub use scan::{ScanArgs, scan};
pub use snapshot::{SnapshotArgs, snapshot};
pub use validate::{ValidateArgs, validate_config};
