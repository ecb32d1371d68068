//! Enumerates the repositories that depend on the target package.
//!
//! Dependents come either from the live listing on GitHub or from a snapshot of it
//! recorded earlier. Both emit the same [`DependentListing`] records.

mod live;
mod page;
mod snapshot;

pub use live::{DEFAULT_PAGE_DELAY, LiveDependents};
pub use page::{DependentsPage, parse_page};
pub use snapshot::SnapshotDependents;

use crate::Result;
use crate::model::DependentListing;
use crate::pipeline::{Outlet, Source, StageName};

/// Either dependents source, chosen at run time.
#[derive(Debug, Clone)]
pub enum Dependents {
    Live(LiveDependents),
    Snapshot(SnapshotDependents),
}

impl Source for Dependents {
    type Out = DependentListing;

    fn name(&self) -> StageName {
        StageName::Dependents
    }

    async fn run(self, outlet: &Outlet<DependentListing>) -> Result<()> {
        match self {
            Self::Live(live) => live.run(outlet).await,
            Self::Snapshot(snapshot) => snapshot.run(outlet).await,
        }
    }
}
