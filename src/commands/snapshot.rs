use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::model::DependentListing;
use crate::pipeline::{Pipeline, PipelineTracker};
use crate::stages::{JsonArraySink, LiveDependents};
use camino::Utf8PathBuf;
use clap::Parser;
use std::sync::Arc;

#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// File the dependents are written to, as a JSON array
    #[arg(value_name = "PATH")]
    pub output: Utf8PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Scrape the dependents listing once and save it for later `scan --snapshot` runs
pub async fn snapshot<H: Host>(host: &mut H, args: &SnapshotArgs) -> Result<()> {
    let mut common = Common::new(host, &args.common)?;
    let config = common.config.clone();

    let source = LiveDependents::new(
        common.web_client()?,
        &config.web_url,
        &config.repository_slug()?,
        config.package_id(),
        config.page_delay(),
    )?;
    let sink = JsonArraySink::<DependentListing>::create(&args.output).await?;

    let tracker = PipelineTracker::new(&common.progress);
    common.progress.set_phase("Listing");

    let result = Pipeline::from_source(source, config.max_repositories_in_memory, Arc::new(tracker))
        .finish(sink)
        .await;

    common.progress.done();

    let summary = result?;
    common.report_summary(&summary, &args.output);
    Ok(())
}
