//! Minimal GitHub GraphQL client for resolving default-branch heads.

use chrono::{DateTime, Utc};
use ohno::{IntoAppError, bail};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

const QUERY: &str = "query($owner: String!, $name: String!) { \
    repository(owner: $owner, name: $name) { defaultBranchRef { target { oid } } } \
    rateLimit { cost limit remaining resetAt } }";

const NOT_FOUND: &str = "NOT_FOUND";

/// Query quota as reported alongside every GraphQL response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub cost: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// What the API said about a repository's default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefOutcome {
    /// Commit id the default branch points at.
    Resolved(String),

    /// The repository does not exist or is not visible.
    NotFound,

    /// The repository exists but has no default branch.
    Empty,
}

/// Outcome of one lookup together with the quota reported by that response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefLookup {
    pub outcome: RefOutcome,
    pub rate_limit: Option<RateLimitInfo>,
}

#[derive(Debug, Deserialize)]
struct Response {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Data {
    repository: Option<Repository>,
    rate_limit: Option<RateLimitInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    default_branch_ref: Option<BranchRef>,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    target: Target,
}

#[derive(Debug, Deserialize)]
struct Target {
    oid: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: String,
}

/// GitHub GraphQL API client.
#[derive(Debug, Clone)]
#[expect(clippy::struct_field_names, reason = "client field stores the underlying HTTP client")]
pub struct GraphQlClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GraphQlClient {
    /// Create a client for the API rooted at `api_url`, authenticating with `token` when given.
    pub fn new(token: Option<&str>, api_url: &str) -> crate::Result<Self> {
        let mut client_builder = reqwest::Client::builder().user_agent(concat!("used-by/", env!("CARGO_PKG_VERSION")));

        if let Some(t) = token {
            let mut auth_val = HeaderValue::from_str(&format!("bearer {t}"))?;
            auth_val.set_sensitive(true);

            let mut headers = HeaderMap::new();
            let _ = headers.insert(AUTHORIZATION, auth_val);

            client_builder = client_builder.default_headers(headers);
        }

        Ok(Self {
            client: client_builder.build()?,
            endpoint: format!("{}/graphql", api_url.trim_end_matches('/')),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Look up the commit the default branch of `owner/name` points at.
    ///
    /// Only a response whose sole error is `NOT_FOUND` counts as a missing repository; any
    /// other error, HTTP failure, or undecodable body is returned as an error.
    pub async fn default_branch_head(&self, owner: &str, name: &str) -> crate::Result<RefLookup> {
        let body = json!({
            "query": QUERY,
            "variables": { "owner": owner, "name": name },
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .into_app_err_with(|| format!("querying default branch of '{owner}/{name}'"))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("GraphQL query for '{owner}/{name}' failed with HTTP status {status}");
        }

        let response: Response = resp
            .json()
            .await
            .into_app_err_with(|| format!("decoding GraphQL response for '{owner}/{name}'"))?;

        classify(response, owner, name)
    }
}

fn classify(response: Response, owner: &str, name: &str) -> crate::Result<RefLookup> {
    let rate_limit = response.data.as_ref().and_then(|d| d.rate_limit);

    if !response.errors.is_empty() {
        if let [only] = response.errors.as_slice()
            && only.kind.as_deref() == Some(NOT_FOUND)
        {
            return Ok(RefLookup {
                outcome: RefOutcome::NotFound,
                rate_limit,
            });
        }

        let messages: Vec<_> = response.errors.iter().map(|e| e.message.as_str()).collect();
        bail!("GraphQL query for '{owner}/{name}' returned errors: {}", messages.join("; "));
    }

    let Some(data) = response.data else {
        bail!("GraphQL response for '{owner}/{name}' has no data");
    };

    let Some(repository) = data.repository else {
        bail!("GraphQL response for '{owner}/{name}' has no repository");
    };

    let outcome = repository
        .default_branch_ref
        .map_or(RefOutcome::Empty, |branch| RefOutcome::Resolved(branch.target.oid));

    Ok(RefLookup { outcome, rate_limit })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: serde_json::Value) -> crate::Result<RefLookup> {
        classify(serde_json::from_value(value).unwrap(), "acme", "shop")
    }

    fn rate_limit_json() -> serde_json::Value {
        json!({ "cost": 1, "limit": 5000, "remaining": 4321, "resetAt": "2024-01-01T00:00:00Z" })
    }

    #[test]
    fn test_resolved() {
        let lookup = parse(json!({
            "data": {
                "repository": { "defaultBranchRef": { "target": { "oid": "deadbeef" } } },
                "rateLimit": rate_limit_json()
            }
        }))
        .unwrap();

        assert_eq!(lookup.outcome, RefOutcome::Resolved("deadbeef".into()));
        let rate_limit = lookup.rate_limit.unwrap();
        assert_eq!(rate_limit.remaining, 4321);
        assert_eq!(rate_limit.reset_at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_single_not_found_error_is_a_skip() {
        let lookup = parse(json!({
            "data": { "repository": null, "rateLimit": rate_limit_json() },
            "errors": [{ "type": "NOT_FOUND", "message": "Could not resolve to a Repository" }]
        }))
        .unwrap();

        assert_eq!(lookup.outcome, RefOutcome::NotFound);
        assert!(lookup.rate_limit.is_some());
    }

    #[test]
    fn test_two_not_found_errors_are_fatal() {
        let result = parse(json!({
            "data": null,
            "errors": [
                { "type": "NOT_FOUND", "message": "first" },
                { "type": "NOT_FOUND", "message": "second" }
            ]
        }));

        let message = result.unwrap_err().to_string();
        assert!(message.contains("first; second"));
    }

    #[test]
    fn test_other_error_is_fatal() {
        let result = parse(json!({
            "errors": [{ "type": "FORBIDDEN", "message": "nope" }]
        }));

        assert!(result.unwrap_err().to_string().contains("nope"));
    }

    #[test]
    fn test_missing_default_branch_is_empty() {
        let lookup = parse(json!({
            "data": { "repository": { "defaultBranchRef": null }, "rateLimit": rate_limit_json() }
        }))
        .unwrap();

        assert_eq!(lookup.outcome, RefOutcome::Empty);
    }

    #[test]
    fn test_missing_data_is_fatal() {
        let _ = parse(json!({})).unwrap_err();
    }

    #[test]
    fn test_endpoint_appends_graphql() {
        let client = GraphQlClient::new(Some("secret"), "https://api.github.com/").unwrap();
        assert_eq!(client.endpoint(), "https://api.github.com/graphql");
    }
}
