//! Drops dependents not worth scanning.

use crate::Result;
use crate::model::{DependentListing, DependentRepository};
use crate::pipeline::{Outlet, Stage, StageName};

const LOG_TARGET: &str = " relevance";

type Predicate = Box<dyn Fn(&DependentRepository) -> bool + Send + Sync>;

/// Passes through the repositories that satisfy a predicate, in order.
///
/// Malformed listing entries never pass.
pub struct RelevanceFilter {
    predicate: Predicate,
}

impl core::fmt::Debug for RelevanceFilter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RelevanceFilter").field("predicate", &"<fn>").finish()
    }
}

impl RelevanceFilter {
    #[must_use]
    pub fn new(predicate: impl Fn(&DependentRepository) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }

    /// Keep repositories with at least `threshold` stars.
    #[must_use]
    pub fn min_stars(threshold: u64) -> Self {
        Self::new(move |repository| repository.stars >= threshold)
    }

    #[must_use]
    pub fn accepts(&self, repository: &DependentRepository) -> bool {
        (self.predicate)(repository)
    }
}

impl Stage for RelevanceFilter {
    type In = DependentListing;
    type Out = DependentRepository;

    fn name(&self) -> StageName {
        StageName::Relevance
    }

    async fn process(&mut self, listing: DependentListing, outlet: &Outlet<DependentRepository>) -> Result<()> {
        match listing {
            DependentListing::Repository(repository) if self.accepts(&repository) => outlet.send(repository).await,
            DependentListing::Repository(repository) => {
                log::debug!(target: LOG_TARGET, "Ignoring '{repository}' ({} stars)", repository.stars);
                Ok(())
            }
            DependentListing::Malformed { error } => {
                log::warn!(target: LOG_TARGET, "Ignoring malformed dependents entry: {error}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{NoopObserver, bounded};
    use std::sync::Arc;

    fn repo(name: &str, stars: u64) -> DependentRepository {
        DependentRepository {
            org_name: "acme".into(),
            repo_name: name.into(),
            stars,
            forks: 0,
        }
    }

    #[test]
    fn test_min_stars_is_inclusive() {
        let filter = RelevanceFilter::min_stars(1);
        assert!(!filter.accepts(&repo("a", 0)));
        assert!(filter.accepts(&repo("b", 1)));
        assert!(filter.accepts(&repo("c", 100)));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_filters_in_order_and_drops_malformed() {
        let (outlet, mut inlet) = bounded(StageName::Relevance, 8, Arc::new(NoopObserver));
        let mut filter = RelevanceFilter::min_stars(1);

        for listing in [
            repo("zero", 0).into(),
            repo("one", 1).into(),
            DependentListing::not_enough_links(),
            repo("five", 5).into(),
        ] {
            filter.process(listing, &outlet).await.unwrap();
        }
        drop(outlet);

        let mut passed = Vec::new();
        while let Some(repository) = inlet.recv().await {
            passed.push(repository.repo_name);
        }
        assert_eq!(passed, vec!["one", "five"]);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_custom_predicate() {
        let (outlet, mut inlet) = bounded(StageName::Relevance, 2, Arc::new(NoopObserver));
        let mut filter = RelevanceFilter::new(|r| r.org_name == "keep");

        let mut kept = repo("x", 0);
        kept.org_name = "keep".into();
        filter.process(kept.clone().into(), &outlet).await.unwrap();
        filter.process(repo("y", 1000).into(), &outlet).await.unwrap();
        drop(outlet);

        assert_eq!(inlet.recv().await, Some(kept));
        assert_eq!(inlet.recv().await, None);
    }
}
