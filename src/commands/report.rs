use super::Host;
use crate::Result;
use crate::model::{AttributeValue, UsageFinding};
use camino::Utf8PathBuf;
use clap::Parser;
use ohno::IntoAppError;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

/// Columns every flattened row starts with, in order.
const BASE_COLUMNS: [&str; 6] = ["repository", "fileName", "component", "line", "usesElements", "spreadsProps"];

#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Findings file written by `scan`
    #[arg(value_name = "PATH")]
    pub findings: Utf8PathBuf,

    /// Only report call sites whose file name, prop names, or prop values contain TEXT
    #[arg(long, value_name = "TEXT")]
    pub contains: Option<String>,

    /// Also write the reported call sites as a flat table, one `$<prop>` column per prop
    #[arg(long, value_name = "PATH")]
    pub flatten: Option<Utf8PathBuf>,

    /// Base URL of the GitHub web site, used for the links
    #[arg(long, value_name = "URL", default_value = "https://github.com", hide = true)]
    pub web_url: String,
}

/// Print a link to every recorded call site, followed by totals
pub async fn report<H: Host>(host: &mut H, args: &ReportArgs) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.findings)
        .await
        .into_app_err_with(|| format!("unable to read findings file '{}'", args.findings))?;
    let findings: Vec<UsageFinding> =
        serde_json::from_str(&text).into_app_err_with(|| format!("unable to parse findings file '{}'", args.findings))?;

    let selected: Vec<&UsageFinding> = findings
        .iter()
        .filter(|finding| args.contains.as_deref().is_none_or(|needle| mentions(finding, needle)))
        .collect();

    let mut repositories = BTreeSet::new();
    let mut files = BTreeSet::new();

    let mut out = host.output();
    for finding in &selected {
        let _ = writeln!(out, "{}", finding.blob_url(&args.web_url));
        let _ = repositories.insert((finding.repository.org_name(), finding.repository.repo_name()));
        let _ = files.insert((finding.repository.org_name(), finding.repository.repo_name(), finding.file_name.as_str()));
    }

    let _ = writeln!(
        out,
        "\n{} call sites in {} files across {} repositories",
        selected.len(),
        files.len(),
        repositories.len()
    );

    if let Some(path) = &args.flatten {
        let rows = flatten(&selected)?;
        let table = serde_json::to_string_pretty(&rows).into_app_err("unable to serialize the flattened table")?;
        tokio::fs::write(path, table)
            .await
            .into_app_err_with(|| format!("unable to write flattened table '{path}'"))?;

        let _ = writeln!(out, "Flattened table written to '{path}'");
    }

    Ok(())
}

/// One row of the flattened table, with its columns in a fixed order.
#[derive(Debug, Clone, PartialEq)]
struct FlatRow(Vec<(String, Value)>);

impl Serialize for FlatRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in &self.0 {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Lay findings out as rows with one `$<prop>` column per explicit prop.
///
/// The first row is a header of nulls naming every column: the base columns followed by the
/// props, most used first. Props used equally often keep the order they were first seen in.
fn flatten(findings: &[&UsageFinding]) -> Result<Vec<FlatRow>> {
    let mut usage: HashMap<&str, usize> = HashMap::new();
    let mut first_seen = Vec::new();
    let mut rows = Vec::with_capacity(findings.len() + 1);

    for finding in findings {
        let repository = serde_json::to_value(&finding.repository).into_app_err("unable to serialize a repository")?;
        let mut columns = vec![
            (BASE_COLUMNS[0].to_string(), repository),
            (BASE_COLUMNS[1].to_string(), Value::from(finding.file_name.as_str())),
            (BASE_COLUMNS[2].to_string(), Value::from(finding.component.as_str())),
            (BASE_COLUMNS[3].to_string(), Value::from(finding.line)),
            (BASE_COLUMNS[4].to_string(), Value::from(finding.uses_elements)),
            (BASE_COLUMNS[5].to_string(), Value::from(finding.spreads_props)),
        ];

        for (prop, value) in &finding.attributes {
            let count = usage.entry(prop.as_str()).or_insert_with(|| {
                first_seen.push(prop.as_str());
                0
            });
            *count += 1;

            let value = match value {
                AttributeValue::Shorthand(flag) => Value::from(*flag),
                AttributeValue::Source(source) => Value::from(source.as_str()),
            };
            columns.push((format!("${prop}"), value));
        }

        rows.push(FlatRow(columns));
    }

    // Stable, so ties stay in first-seen order.
    first_seen.sort_by(|a, b| usage[b].cmp(&usage[a]));

    let header = BASE_COLUMNS
        .iter()
        .map(|column| (*column).to_string())
        .chain(first_seen.iter().map(|prop| format!("${prop}")))
        .map(|column| (column, Value::Null))
        .collect();

    rows.insert(0, FlatRow(header));
    Ok(rows)
}

fn mentions(finding: &UsageFinding, needle: &str) -> bool {
    finding.file_name.contains(needle)
        || finding.attributes.iter().any(|(name, value)| {
            name.contains(needle)
                || match value {
                    AttributeValue::Source(source) => source.contains(needle),
                    AttributeValue::Shorthand(_) => false,
                }
        })
}
