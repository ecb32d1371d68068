//! Resolves each dependent repository to the head commit of its default branch.

mod client;
mod rate_limiter;

pub use client::{GraphQlClient, RateLimitInfo, RefLookup, RefOutcome};
pub use rate_limiter::RateLimiter;

use crate::Result;
use crate::model::{DependentRepository, ResolvedRepository};
use crate::pipeline::{Outlet, Stage, StageName};

const LOG_TARGET: &str = "      refs";

/// Pins repositories to a commit, one GraphQL query at a time.
///
/// Repositories that no longer exist, and repositories without a default branch, are
/// skipped. Anything else going wrong with a query is fatal.
#[derive(Debug)]
pub struct RefResolver {
    client: GraphQlClient,
    limiter: RateLimiter,
}

impl RefResolver {
    #[must_use]
    pub const fn new(client: GraphQlClient, limiter: RateLimiter) -> Self {
        Self { client, limiter }
    }
}

impl Stage for RefResolver {
    type In = DependentRepository;
    type Out = ResolvedRepository;

    fn name(&self) -> StageName {
        StageName::Refs
    }

    async fn process(&mut self, repository: DependentRepository, outlet: &Outlet<ResolvedRepository>) -> Result<()> {
        let _ = self.limiter.wait_if_needed().await;

        let lookup = self
            .client
            .default_branch_head(&repository.org_name, &repository.repo_name)
            .await?;

        if let Some(rate_limit) = &lookup.rate_limit {
            self.limiter.observe(rate_limit);
            outlet.report_rate_limit(rate_limit.remaining);
        }

        match lookup.outcome {
            RefOutcome::Resolved(git_ref) => {
                log::debug!(target: LOG_TARGET, "Resolved '{repository}' to {git_ref}");
                outlet.send(ResolvedRepository { repository, git_ref }).await
            }

            RefOutcome::NotFound => {
                log::debug!(target: LOG_TARGET, "Repository '{repository}' not found, skipping");
                outlet.record_skip();
                Ok(())
            }

            RefOutcome::Empty => {
                log::warn!(target: LOG_TARGET, "Repository '{repository}' has no default branch, skipping");
                outlet.record_skip();
                Ok(())
            }
        }
    }
}
