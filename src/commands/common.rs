//! Setup shared by every command that talks to GitHub.

use super::config::Config;
use super::{Host, ProgressReporter};
use crate::Result;
use crate::pipeline::{PipelineSummary, Progress, StageName};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use core::time::Duration;
use ohno::{IntoAppError, bail};
use std::io::Write;
use std::sync::Arc;

/// Secondary environment variable consulted for the GitHub token.
const FALLBACK_TOKEN_VAR: &str = "GITHUB_API_TOKEN";

/// Color mode configuration for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always use colors
    Always,

    /// Never use colors
    Never,

    /// Use colors if the output is a terminal, otherwise don't use colors
    Auto,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments shared by the commands that query GitHub
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// GitHub personal access token (falls back to `GITHUB_API_TOKEN`)
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Path to configuration file (default is `used-by.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Repository whose dependents are enumerated, as `owner/name`
    #[arg(long, value_name = "OWNER/NAME")]
    pub repository: Option<String>,

    /// Package of the repository to list dependents for
    #[arg(long, value_name = "ID")]
    pub package_id: Option<String>,

    /// Pause between two dependents pages, in milliseconds
    #[arg(long, value_name = "MS")]
    pub page_delay_ms: Option<u64>,

    /// Base URL of the GitHub web site
    #[arg(long, value_name = "URL", hide = true)]
    pub web_url: Option<String>,

    /// Base URL of the GitHub API
    #[arg(long, value_name = "URL", hide = true)]
    pub api_url: Option<String>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

pub struct Common<'a, H: Host> {
    pub config: Config,
    pub host: &'a mut H,
    pub progress: Arc<dyn Progress>,
    github_token: Option<String>,
}

impl<'a, H: Host> Common<'a, H> {
    /// Initialize logging, load the configuration, and start the progress display
    ///
    /// Command-line values override the configuration file.
    pub fn new(host: &'a mut H, args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);

        let mut config = Config::load(Utf8Path::new("."), args.config.as_ref())?;
        if let Some(repository) = &args.repository {
            config.repository.clone_from(repository);
        }
        if let Some(package_id) = &args.package_id {
            config.package_id.clone_from(package_id);
        }
        if let Some(delay) = args.page_delay_ms {
            config.page_delay_ms = delay;
        }
        if let Some(url) = &args.web_url {
            config.web_url.clone_from(url);
        }
        if let Some(url) = &args.api_url {
            config.api_url.clone_from(url);
        }
        config.validate()?;

        let delay = if args.log_level == LogLevel::None {
            Duration::from_millis(300)
        } else {
            Duration::from_hours(365 * 24)
        };

        let use_colors = match args.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => {
                use std::io::{IsTerminal, stderr};
                stderr().is_terminal()
            }
        };

        let github_token = args
            .github_token
            .clone()
            .or_else(|| std::env::var(FALLBACK_TOKEN_VAR).ok())
            .filter(|t| !t.is_empty());

        Ok(Self {
            config,
            host,
            progress: Arc::new(ProgressReporter::new(delay, use_colors)),
            github_token,
        })
    }

    /// The GitHub token, which the ref lookups cannot do without
    pub fn require_token(&self) -> Result<&str> {
        match self.github_token.as_deref() {
            Some(token) => Ok(token),
            None => bail!("a GitHub token is required; pass --github-token or set GITHUB_TOKEN"),
        }
    }

    /// HTTP client for the web site, used for dependents pages and archives
    pub fn web_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(concat!("used-by/", env!("CARGO_PKG_VERSION")))
            .build()
            .into_app_err("creating HTTP client")
    }

    /// Print the per-stage totals of a finished run
    pub fn report_summary(&mut self, summary: &PipelineSummary, output: &Utf8Path) {
        let mut out = self.host.output();
        for (stage, counts) in &summary.stages {
            let _ = write!(out, "{:>12}: {} in, {} out", stage.to_string(), counts.received, counts.emitted);
            if counts.skipped > 0 {
                let _ = write!(out, ", {} skipped", counts.skipped);
            }
            let _ = writeln!(out);
        }

        if summary.counts(StageName::Refs).received > 0 {
            let _ = writeln!(
                out,
                "Skipped {} missing repositories and {} unreadable archives",
                summary.skipped_repositories(),
                summary.failed_archives()
            );
        }

        if let Some(quota) = summary.remaining_quota {
            let _ = writeln!(out, "Remaining query quota: {quota}");
        }

        let _ = writeln!(out, "Wrote {} records to {output}", summary.records_written);
    }
}

/// Initialize logger based on log level
///
/// Only the first call in a process takes effect.
fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .try_init();
}
