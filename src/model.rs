//! Records exchanged between pipeline stages.
//!
//! Each stage consumes one record type and produces another; nothing grows fields
//! on the way through. Field names serialize in camelCase so the JSON files written
//! by the sink keep the camelCase layout downstream consumers read.

use core::fmt::{Display, Formatter};
use core::str::FromStr;
use ohno::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message attached to a listing entry whose shape could not be understood.
pub const NOT_ENOUGH_LINKS: &str = "not enough links";

/// An `owner/name` pair identifying a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositorySlug {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepositorySlug {
    type Err = ohno::AppError;

    fn from_str(s: &str) -> crate::Result<Self> {
        let Some((owner, name)) = s.trim().split_once('/') else {
            bail!("invalid repository '{s}': expected 'owner/name'");
        };

        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{s}': expected 'owner/name'");
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl Display for RepositorySlug {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A repository that declares a dependency on the target package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentRepository {
    pub org_name: String,
    pub repo_name: String,
    pub stars: u64,
    pub forks: u64,
}

impl Display for DependentRepository {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.org_name, self.repo_name)
    }
}

/// One entry of the dependents listing.
///
/// Entries the scraper cannot make sense of are kept as [`DependentListing::Malformed`]
/// so that format drift on the listing page shows up in the output instead of silently
/// shrinking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependentListing {
    Repository(DependentRepository),
    Malformed { error: String },
}

impl DependentListing {
    #[must_use]
    pub fn not_enough_links() -> Self {
        Self::Malformed {
            error: NOT_ENOUGH_LINKS.to_string(),
        }
    }
}

impl From<DependentRepository> for DependentListing {
    fn from(repository: DependentRepository) -> Self {
        Self::Repository(repository)
    }
}

/// A dependent repository pinned to the commit its default branch pointed at when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRepository {
    #[serde(flatten)]
    pub repository: DependentRepository,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl ResolvedRepository {
    #[must_use]
    pub fn org_name(&self) -> &str {
        &self.repository.org_name
    }

    #[must_use]
    pub fn repo_name(&self) -> &str {
        &self.repository.repo_name
    }

    /// Prefix GitHub puts in front of every entry of a ref archive.
    #[must_use]
    pub fn archive_prefix(&self) -> String {
        format!("{}-{}/", self.repository.repo_name, self.git_ref)
    }
}

impl Display for ResolvedRepository {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.repository, self.git_ref)
    }
}

/// One regular-file entry of a repository archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_name: String,
    pub source: String,
    pub repository: ResolvedRepository,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileRecord {
    #[must_use]
    pub const fn decoded(file_name: String, source: String, repository: ResolvedRepository) -> Self {
        Self {
            file_name,
            source,
            repository,
            error: None,
        }
    }

    #[must_use]
    pub const fn failed(file_name: String, repository: ResolvedRepository, error: String) -> Self {
        Self {
            file_name,
            source: String::new(),
            repository,
            error: Some(error),
        }
    }
}

/// A source file that plausibly references the target package, named relative to its repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageFile {
    pub name: String,
    pub repository: ResolvedRepository,
    pub source: String,
}

/// Value of an explicit prop at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean shorthand such as `<Select disabled />`, serialized as the literal `true`.
    Shorthand(bool),

    /// Source text of the value, e.g. `"bar"` or `{value}`.
    Source(String),
}

/// One confirmed call site of the tracked component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageFinding {
    pub repository: ResolvedRepository,
    pub file_name: String,
    pub component: String,
    pub line: usize,
    pub uses_elements: bool,
    pub spreads_props: bool,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl UsageFinding {
    /// Link to the call site on GitHub.
    #[must_use]
    pub fn blob_url(&self, web_url: &str) -> String {
        format!(
            "{}/{}/{}/blob/{}/{}#L{}",
            web_url.trim_end_matches('/'),
            self.repository.org_name(),
            self.repository.repo_name(),
            self.repository.git_ref,
            self.file_name,
            self.line
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolved() -> ResolvedRepository {
        ResolvedRepository {
            repository: DependentRepository {
                org_name: "acme".into(),
                repo_name: "shop".into(),
                stars: 12,
                forks: 3,
            },
            git_ref: "abc123".into(),
        }
    }

    #[test]
    fn test_repository_slug_parse() {
        let slug: RepositorySlug = "mui-org/material-ui".parse().unwrap();
        assert_eq!(slug.owner, "mui-org");
        assert_eq!(slug.name, "material-ui");
        assert_eq!(slug.to_string(), "mui-org/material-ui");

        for bad in ["", "nobody", "/x", "x/", "a/b/c"] {
            let _ = bad.parse::<RepositorySlug>().unwrap_err();
        }
    }

    #[test]
    fn test_dependent_repository_uses_camel_case() {
        let value = serde_json::to_value(&resolved().repository).unwrap();
        assert_eq!(value, json!({ "orgName": "acme", "repoName": "shop", "stars": 12, "forks": 3 }));
    }

    #[test]
    fn test_malformed_listing_serializes_as_error_object() {
        let value = serde_json::to_value(DependentListing::not_enough_links()).unwrap();
        assert_eq!(value, json!({ "error": "not enough links" }));
    }

    #[test]
    fn test_listing_deserializes_both_shapes() {
        let listings: Vec<DependentListing> = serde_json::from_value(json!([
            { "orgName": "a", "repoName": "b", "stars": 1, "forks": 0 },
            { "error": "not enough links" }
        ]))
        .unwrap();

        assert!(matches!(listings[0], DependentListing::Repository(_)));
        assert_eq!(listings[1], DependentListing::not_enough_links());
    }

    #[test]
    fn test_resolved_repository_flattens_and_renames_ref() {
        let value = serde_json::to_value(resolved()).unwrap();
        assert_eq!(value["ref"], json!("abc123"));
        assert_eq!(value["orgName"], json!("acme"));
    }

    #[test]
    fn test_archive_prefix() {
        assert_eq!(resolved().archive_prefix(), "shop-abc123/");
    }

    #[test]
    fn test_file_record_error_is_omitted_when_absent() {
        let record = FileRecord::decoded("shop-abc123/index.js".into(), "x".into(), resolved());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("error").is_none());

        let failed = FileRecord::failed("shop-abc123/bad.js".into(), resolved(), "boom".into());
        assert_eq!(failed.source, "");
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_attribute_values_serialize_untagged() {
        let mut attributes = BTreeMap::new();
        let _ = attributes.insert("disabled".to_string(), AttributeValue::Shorthand(true));
        let _ = attributes.insert("foo".to_string(), AttributeValue::Source("\"bar\"".into()));

        let value = serde_json::to_value(&attributes).unwrap();
        assert_eq!(value, json!({ "disabled": true, "foo": "\"bar\"" }));
    }

    #[test]
    fn test_blob_url() {
        let finding = UsageFinding {
            repository: resolved(),
            file_name: "src/App.js".into(),
            component: "Select".into(),
            line: 42,
            uses_elements: false,
            spreads_props: false,
            attributes: BTreeMap::new(),
        };

        assert_eq!(
            finding.blob_url("https://github.com/"),
            "https://github.com/acme/shop/blob/abc123/src/App.js#L42"
        );
    }
}
