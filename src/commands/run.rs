//! Command dispatch logic for used-by

use super::{
    InitArgs, ReportArgs, ScanArgs, SnapshotArgs, ValidateArgs, init_config, report, scan, snapshot, validate_config,
};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};
use std::io::Write;

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "used-by", version, author, long_about = None)]
#[command(about = "Find the repositories that depend on a package and record how they use one of its components")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the dependents of a repository for call sites of a component
    Scan(Box<ScanArgs>),
    /// Save the dependents listing of a repository for later scans
    Snapshot(Box<SnapshotArgs>),
    /// Print a link to every call site in a findings file
    Report(ReportArgs),
    /// Generate a default configuration file
    Init(InitArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// A failing command has its error written to the host's error stream before the host
/// is asked to exit with status 1.
///
/// # Errors
///
/// Returns an error if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    let cli = Cli::parse_from(args);

    let result = match &cli.command {
        Command::Scan(args) => scan(host, args).await,
        Command::Snapshot(args) => snapshot(host, args).await,
        Command::Report(args) => report(host, args).await,
        Command::Init(args) => init_config(host, args),
        Command::Validate(args) => validate_config(host, args),
    };

    if let Err(e) = &result {
        let _ = writeln!(host.error(), "error: {e}");
        host.exit(1);
    }

    result
}
