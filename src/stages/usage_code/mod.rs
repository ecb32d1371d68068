//! Turns candidate files into confirmed usages of the tracked component.

mod extractor;

pub use extractor::{CallSite, UsageExtractor};

use crate::Result;
use crate::model::{UsageFile, UsageFinding};
use crate::pipeline::{Outlet, Stage, StageName};
use ohno::{IntoAppError, app_err};
use tokio::task::spawn_blocking;

const LOG_TARGET: &str = "usage-code";

/// Package whose component usage is tracked, by default.
pub const DEFAULT_PACKAGE: &str = "@material-ui/core";

/// Component whose call sites are extracted, by default.
pub const DEFAULT_COMPONENT: &str = "Select";

/// The component whose usage is tracked and the package that exports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageTarget {
    pub package: String,
    pub component: String,
}

impl Default for UsageTarget {
    fn default() -> Self {
        Self {
            package: DEFAULT_PACKAGE.to_string(),
            component: DEFAULT_COMPONENT.to_string(),
        }
    }
}

/// Emits one [`UsageFinding`] per call site of the target component.
///
/// Files that do not mention the package at all are dropped without parsing.
#[derive(Debug)]
pub struct UsageCodeFilter {
    target: UsageTarget,

    // Lent to the blocking pool while a file is being parsed.
    extractor: Option<UsageExtractor>,
}

impl UsageCodeFilter {
    pub fn new(target: UsageTarget) -> Result<Self> {
        Ok(Self {
            extractor: Some(UsageExtractor::new(target.clone())?),
            target,
        })
    }

    /// Whether `source` could possibly use the target package.
    #[must_use]
    pub fn is_relevant(&self, source: &str) -> bool {
        source.contains(self.target.package.as_str())
    }

    /// Parse `source` off the async runtime.
    async fn extract(&mut self, file_name: &str, source: String) -> Result<Option<Vec<CallSite>>> {
        let mut extractor = self
            .extractor
            .take()
            .ok_or_else(|| app_err!("the usage extractor was lost by an earlier failure"))?;

        let name = file_name.to_string();
        let (extractor, sites) = spawn_blocking(move || {
            let sites = extractor.extract(&name, &source);
            (extractor, sites)
        })
        .await
        .into_app_err_with(|| format!("parsing '{file_name}'"))?;

        self.extractor = Some(extractor);
        Ok(sites)
    }
}

impl Stage for UsageCodeFilter {
    type In = UsageFile;
    type Out = UsageFinding;

    fn name(&self) -> StageName {
        StageName::UsageCode
    }

    async fn process(&mut self, mut file: UsageFile, outlet: &Outlet<UsageFinding>) -> Result<()> {
        if !self.is_relevant(&file.source) {
            return Ok(());
        }

        let source = core::mem::take(&mut file.source);
        let Some(sites) = self.extract(&file.name, source).await? else {
            log::warn!(target: LOG_TARGET, "Could not parse '{}' in '{}', skipping", file.name, file.repository);
            return Ok(());
        };

        log::debug!(target: LOG_TARGET, "Found {} call site(s) in '{}' of '{}'", sites.len(), file.name, file.repository);

        let component = &self.target.component;
        for site in sites {
            outlet
                .send(UsageFinding {
                    repository: file.repository.clone(),
                    file_name: file.name.clone(),
                    component: component.clone(),
                    line: site.line,
                    uses_elements: site.uses_elements,
                    spreads_props: site.spreads_props,
                    attributes: site.attributes,
                })
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependentRepository, ResolvedRepository};
    use crate::pipeline::{NoopObserver, bounded};
    use std::sync::Arc;

    fn usage_file(name: &str, source: &str) -> UsageFile {
        UsageFile {
            name: name.into(),
            repository: ResolvedRepository {
                repository: DependentRepository {
                    org_name: "acme".into(),
                    repo_name: "shop".into(),
                    stars: 1,
                    forks: 0,
                },
                git_ref: "abc123".into(),
            },
            source: source.into(),
        }
    }

    #[test]
    fn test_relevance_is_a_substring_check() {
        let filter = UsageCodeFilter::new(UsageTarget::default()).unwrap();
        assert!(filter.is_relevant("// uses @material-ui/core somewhere"));
        assert!(!filter.is_relevant("import React from 'react';"));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_emits_findings_for_each_call_site() {
        let (outlet, mut inlet) = bounded(StageName::UsageCode, 8, Arc::new(NoopObserver));
        let mut filter = UsageCodeFilter::new(UsageTarget::default()).unwrap();

        let source = r#"import { Select } from "@material-ui/core";
export const A = () => <Select native />;
export const B = () => <Select {...rest} />;
"#;
        filter.process(usage_file("src/A.jsx", source), &outlet).await.unwrap();
        filter
            .process(usage_file("src/B.jsx", "const x = <Select />;"), &outlet)
            .await
            .unwrap();
        drop(outlet);

        let first = inlet.recv().await.unwrap();
        assert_eq!(first.file_name, "src/A.jsx");
        assert_eq!(first.component, "Select");
        assert_eq!(first.line, 2);

        let second = inlet.recv().await.unwrap();
        assert_eq!(second.line, 3);
        assert!(second.spreads_props);

        assert_eq!(inlet.recv().await, None);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_custom_target() {
        let (outlet, mut inlet) = bounded(StageName::UsageCode, 8, Arc::new(NoopObserver));
        let mut filter = UsageCodeFilter::new(UsageTarget {
            package: "@acme/ui".into(),
            component: "Button".into(),
        })
        .unwrap();

        let source = "import { Button } from '@acme/ui';\nconst A = () => <Button kind=\"primary\">Go</Button>;\n";
        filter.process(usage_file("src/A.tsx", source), &outlet).await.unwrap();
        drop(outlet);

        let finding = inlet.recv().await.unwrap();
        assert_eq!(finding.component, "Button");
        assert!(!finding.uses_elements);
        assert_eq!(inlet.recv().await, None);
    }
}
