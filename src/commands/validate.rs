use super::Host;
use super::config::Config;
use crate::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file (default is `used-by.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,
}

pub fn validate_config<H: Host>(host: &mut H, args: &ValidateArgs) -> Result<()> {
    let config = Config::load(Utf8Path::new("."), args.config.as_ref())?;

    let _ = writeln!(host.output(), "Configuration file is valid");
    match &args.config {
        Some(path) => {
            let _ = writeln!(host.output(), "Config file: {path}");
        }
        None => {
            let _ = writeln!(host.output(), "Using defaults where no setting is given");
        }
    }
    let _ = writeln!(
        host.output(),
        "Scanning dependents of {} for <{}> from '{}'",
        config.repository,
        config.component,
        config.package
    );

    Ok(())
}
