//! Keeps the archive entries that may contain JSX and strips the archive prefix from their names.

use crate::Result;
use crate::model::{FileRecord, UsageFile};
use crate::pipeline::{Outlet, Stage, StageName};
use regex::Regex;
use std::sync::LazyLock;

const LOG_TARGET: &str = "usage-files";

static SCRIPT_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(jsx?|tsx?)$").expect("pattern is valid"));

/// Directory names whose contents are third-party code, by default.
pub const DEFAULT_VENDORED_DIRS: &[&str] = &["node_modules"];

/// Passes JavaScript and TypeScript files that are not vendored.
#[derive(Debug, Clone)]
pub struct UsageFileFilter {
    vendored_segments: Vec<String>,
}

impl UsageFileFilter {
    #[must_use]
    pub fn new<S: AsRef<str>>(vendored_dirs: &[S]) -> Self {
        Self {
            vendored_segments: vendored_dirs.iter().map(|dir| format!("/{}/", dir.as_ref())).collect(),
        }
    }

    /// Whether the archive entry `file_name` is worth scanning.
    #[must_use]
    pub fn accepts(&self, file_name: &str) -> bool {
        SCRIPT_FILE.is_match(file_name) && !self.vendored_segments.iter().any(|segment| file_name.contains(segment.as_str()))
    }
}

impl Default for UsageFileFilter {
    fn default() -> Self {
        Self::new(DEFAULT_VENDORED_DIRS)
    }
}

impl Stage for UsageFileFilter {
    type In = FileRecord;
    type Out = UsageFile;

    fn name(&self) -> StageName {
        StageName::UsageFiles
    }

    async fn process(&mut self, file: FileRecord, outlet: &Outlet<UsageFile>) -> Result<()> {
        if let Some(error) = &file.error {
            log::debug!(target: LOG_TARGET, "Ignoring unreadable '{}' in '{}': {error}", file.file_name, file.repository);
            return Ok(());
        }

        if !self.accepts(&file.file_name) {
            return Ok(());
        }

        let prefix = file.repository.archive_prefix();
        let name = file.file_name.strip_prefix(&prefix).unwrap_or(&file.file_name).to_string();

        outlet
            .send(UsageFile {
                name,
                repository: file.repository,
                source: file.source,
            })
            .await
    }
}
