use super::page::parse_page;
use crate::Result;
use crate::model::{DependentListing, RepositorySlug};
use crate::pipeline::{Outlet, Source, StageName};
use core::time::Duration;
use ohno::{IntoAppError, bail};
use url::Url;

const LOG_TARGET: &str = "dependents";

/// Default pause between two page fetches; GitHub starts answering 429 at around two seconds.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(3);

/// Scrapes the dependents listing of a repository page by page.
#[derive(Debug, Clone)]
pub struct LiveDependents {
    client: reqwest::Client,
    start_url: Url,
    page_delay: Duration,
}

impl LiveDependents {
    /// List the dependents of `repository`, narrowed to one package of it when `package_id` is given.
    pub fn new(
        client: reqwest::Client,
        web_url: &str,
        repository: &RepositorySlug,
        package_id: Option<&str>,
        page_delay: Duration,
    ) -> Result<Self> {
        let base = format!(
            "{}/{}/{}/network/dependents",
            web_url.trim_end_matches('/'),
            repository.owner,
            repository.name
        );
        let mut start_url = Url::parse(&base).into_app_err_with(|| format!("invalid dependents URL '{base}'"))?;

        {
            let mut query = start_url.query_pairs_mut();
            if let Some(id) = package_id {
                let _ = query.append_pair("package_id", id);
            }
            let _ = query.append_pair("dependent_type", "REPOSITORY");
        }

        Ok(Self {
            client,
            start_url,
            page_delay,
        })
    }

    #[must_use]
    pub const fn start_url(&self) -> &Url {
        &self.start_url
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .into_app_err_with(|| format!("fetching dependents page '{url}'"))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("dependents page '{url}' returned HTTP status {status}");
        }

        resp.text()
            .await
            .into_app_err_with(|| format!("reading dependents page '{url}'"))
    }
}

impl Source for LiveDependents {
    type Out = DependentListing;

    fn name(&self) -> StageName {
        StageName::Dependents
    }

    async fn run(self, outlet: &Outlet<DependentListing>) -> Result<()> {
        let mut cursor = Some(self.start_url.clone());
        let mut pages = 0_u64;

        while let Some(url) = cursor {
            if pages > 0 {
                tokio::time::sleep(self.page_delay).await;
            }

            log::debug!(target: LOG_TARGET, "Fetching dependents page {}: {url}", pages + 1);
            let body = self.fetch(&url).await?;

            // The parsed document is not Send, so it must be gone before the next await.
            let page = parse_page(&body, &url);
            pages += 1;

            log::debug!(target: LOG_TARGET, "Page {pages} listed {} dependents", page.listings.len());
            for listing in page.listings {
                outlet.send(listing).await?;
            }

            cursor = page.next;
        }

        log::info!(target: LOG_TARGET, "Enumerated {pages} dependents page(s)");
        Ok(())
    }
}
