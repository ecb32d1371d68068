use crate::Result;
use crate::model::DependentListing;
use crate::pipeline::{Outlet, Source, StageName};
use camino::Utf8PathBuf;
use ohno::IntoAppError;

const LOG_TARGET: &str = "dependents";

/// Replays a dependents listing captured earlier with the `snapshot` command.
#[derive(Debug, Clone)]
pub struct SnapshotDependents {
    path: Utf8PathBuf,
}

impl SnapshotDependents {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every entry of the snapshot file.
    pub async fn load(&self) -> Result<Vec<DependentListing>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .into_app_err_with(|| format!("unable to read snapshot file '{}'", self.path))?;

        serde_json::from_slice(&bytes).into_app_err_with(|| format!("unable to parse snapshot file '{}'", self.path))
    }
}

impl Source for SnapshotDependents {
    type Out = DependentListing;

    fn name(&self) -> StageName {
        StageName::Dependents
    }

    async fn run(self, outlet: &Outlet<DependentListing>) -> Result<()> {
        let listings = self.load().await?;
        log::info!(target: LOG_TARGET, "Replaying {} dependents from '{}'", listings.len(), self.path);

        for listing in listings {
            outlet.send(listing).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{NoopObserver, bounded};
    use std::sync::Arc;

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_replays_entries_in_order_including_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"[
                {"orgName":"a","repoName":"one","stars":3,"forks":1},
                {"error":"not enough links"},
                {"orgName":"b","repoName":"two","stars":0,"forks":0}
            ]"#,
        )
        .unwrap();

        let snapshot = SnapshotDependents::new(Utf8PathBuf::from_path_buf(path).unwrap());
        let (outlet, mut inlet) = bounded(StageName::Dependents, 8, Arc::new(NoopObserver));
        snapshot.run(&outlet).await.unwrap();
        drop(outlet);

        let mut replayed = Vec::new();
        while let Some(listing) = inlet.recv().await {
            replayed.push(listing);
        }

        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed[1], DependentListing::not_enough_links());
        assert!(matches!(&replayed[2], DependentListing::Repository(r) if r.repo_name == "two"));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_missing_file_is_an_error() {
        let snapshot = SnapshotDependents::new("/nonexistent/snapshot.json");
        let (outlet, _inlet) = bounded(StageName::Dependents, 1, Arc::new(NoopObserver));

        let message = snapshot.run(&outlet).await.unwrap_err().to_string();
        assert!(message.contains("unable to read snapshot file"));
    }
}
