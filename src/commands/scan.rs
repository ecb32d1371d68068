use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::model::UsageFinding;
use crate::pipeline::{Pipeline, PipelineTracker};
use crate::stages::{
    ArchiveFetcher, Dependents, GraphQlClient, JsonArraySink, LiveDependents, RateLimiter, RefResolver, RelevanceFilter,
    SnapshotDependents, UsageCodeFilter, UsageFileFilter, UsageTarget,
};
use camino::Utf8PathBuf;
use clap::Parser;
use std::sync::Arc;

const LOG_TARGET: &str = "      scan";

#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// File the findings are written to, as a JSON array
    #[arg(value_name = "PATH")]
    pub output: Utf8PathBuf,

    /// Read dependents from a file written by `snapshot` instead of scraping them
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<Utf8PathBuf>,

    /// Dependents with fewer stars are not scanned
    #[arg(long, value_name = "N")]
    pub min_stars: Option<u64>,

    /// Package whose component usage is tracked
    #[arg(long, value_name = "NAME")]
    pub package: Option<String>,

    /// Component whose call sites are extracted
    #[arg(long, value_name = "NAME")]
    pub component: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Run the full pipeline, writing every call site of the tracked component to `args.output`
pub async fn scan<H: Host>(host: &mut H, args: &ScanArgs) -> Result<()> {
    let mut common = Common::new(host, &args.common)?;
    if let Some(min_stars) = args.min_stars {
        common.config.min_stars = min_stars;
    }
    if let Some(package) = &args.package {
        common.config.package.clone_from(package);
    }
    if let Some(component) = &args.component {
        common.config.component.clone_from(component);
    }
    common.config.validate()?;

    let config = common.config.clone();
    let web_client = common.web_client()?;

    let source = if let Some(path) = &args.snapshot {
        Dependents::Snapshot(SnapshotDependents::new(path.clone()))
    } else {
        Dependents::Live(LiveDependents::new(
            web_client.clone(),
            &config.web_url,
            &config.repository_slug()?,
            config.package_id(),
            config.page_delay(),
        )?)
    };

    let graphql = GraphQlClient::new(Some(common.require_token()?), &config.api_url)?;
    let usage = UsageCodeFilter::new(UsageTarget {
        package: config.package.clone(),
        component: config.component.clone(),
    })?;
    let sink = JsonArraySink::<UsageFinding>::create(&args.output).await?;

    log::info!(target: LOG_TARGET, "Scanning dependents of {} for <{}> from '{}'", config.repository, config.component, config.package);

    let tracker = PipelineTracker::new(&common.progress);
    common.progress.set_phase("Scanning");

    let repositories = config.max_repositories_in_memory;
    let files = config.max_files_in_memory;
    let result = Pipeline::from_source(source, repositories, Arc::new(tracker))
        .then(RelevanceFilter::min_stars(config.min_stars), repositories)
        .then(RefResolver::new(graphql, RateLimiter::new(config.rate_limit_low_water)), repositories)
        .then(ArchiveFetcher::new(web_client, &config.web_url), files)
        .then(UsageFileFilter::new(&config.vendored_dirs), files)
        .then(usage, files)
        .finish(sink)
        .await;

    common.progress.done();

    let summary = result?;
    common.report_summary(&summary, &args.output);
    Ok(())
}
