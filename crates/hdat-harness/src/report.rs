//! CSV export of archived results.
//!
//! Columns are chosen with comma-separated key specifiers: dotted paths
//! into a JSON view of each result (context excluded). A trailing `*`
//! expands to every key of the object at that path, so `metrics.*` yields
//! one column per metric. The header is the sorted union of all expanded
//! keys; cells for keys a result lacks stay empty.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use hdat_error::Result;
use hdat_types::{CaseInput, Metrics, ResultRecord, Status};
use serde::Serialize;
use serde_json::Value;

/// Columns used when no key specifiers are given.
pub const DEFAULT_CSV_KEYS: &str = "case_id,result_id,ran_on,commit,metrics.*";

#[derive(Serialize)]
struct ResultView<'a> {
    suite_id: &'a str,
    case_id: &'a str,
    result_id: &'a str,
    case_input: &'a CaseInput,
    metrics: &'a Metrics,
    commit: &'a str,
    repo_dirty: bool,
    ran_on: f64,
    status: Status,
}

impl<'a> From<&'a ResultRecord> for ResultView<'a> {
    fn from(result: &'a ResultRecord) -> Self {
        Self {
            suite_id: &result.suite_id,
            case_id: &result.case_id,
            result_id: &result.result_id,
            case_input: &result.case_input,
            metrics: &result.metrics,
            commit: &result.commit,
            repo_dirty: result.repo_dirty,
            ran_on: result.ran_on,
            status: result.status,
        }
    }
}

/// Write `results` as CSV using `keys` (or [`DEFAULT_CSV_KEYS`]).
pub fn write_csv(results: &[ResultRecord], keys: Option<&str>, out: &mut dyn Write) -> Result<()> {
    let keys = keys
        .filter(|keys| !keys.trim().is_empty())
        .unwrap_or(DEFAULT_CSV_KEYS);
    let specifiers: Vec<Vec<&str>> = keys
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| key.split('.').collect())
        .collect();

    let mut header = BTreeSet::new();
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        let view = serde_json::to_value(ResultView::from(result))?;
        let mut row = BTreeMap::new();
        for specifier in &specifiers {
            for path in expand(&view, specifier) {
                let cell = lookup(&view, &path).map(render).unwrap_or_default();
                let column = path.join(".");
                header.insert(column.clone());
                row.insert(column, cell);
            }
        }
        rows.push(row);
    }

    write_record(out, header.iter().map(String::as_str))?;
    for row in &rows {
        write_record(
            out,
            header
                .iter()
                .map(|column| row.get(column).map_or("", String::as_str)),
        )?;
    }
    Ok(())
}

fn expand(view: &Value, specifier: &[&str]) -> Vec<Vec<String>> {
    let owned = |parts: &[&str]| -> Vec<String> { parts.iter().map(|p| (*p).to_owned()).collect() };
    match specifier.split_last() {
        Some((&"*", parent)) => {
            let parent = owned(parent);
            match lookup(view, &parent) {
                Some(Value::Object(map)) => map
                    .keys()
                    .map(|key| {
                        let mut path = parent.clone();
                        path.push(key.clone());
                        path
                    })
                    .collect(),
                _ => Vec::new(),
            }
        }
        _ => vec![owned(specifier)],
    }
}

fn lookup<'v>(view: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter()
        .try_fold(view, |node, key| node.as_object()?.get(key))
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn write_record<'a>(out: &mut dyn Write, fields: impl Iterator<Item = &'a str>) -> Result<()> {
    let line: Vec<String> = fields.map(quote).collect();
    writeln!(out, "{}", line.join(","))?;
    Ok(())
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use hdat_types::{Context, MetricValue};

    use super::*;

    fn result(case_id: &str, metrics: &[(&str, MetricValue)]) -> ResultRecord {
        ResultRecord {
            suite_id: "a".to_owned(),
            case_id: case_id.to_owned(),
            result_id: format!("1.500000_{case_id}"),
            case_input: serde_json::json!({"path": "in,put.png"}),
            metrics: metrics
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
            context: Context::Bytes(vec![0; 8]),
            commit: "abc".to_owned(),
            repo_dirty: false,
            ran_on: 1.5,
            status: Status::Pass,
        }
    }

    fn render_csv(results: &[ResultRecord], keys: Option<&str>) -> String {
        let mut out = Vec::new();
        write_csv(results, keys, &mut out).expect("csv");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn default_keys_expand_metrics_and_sort_header() {
        let rows = [
            result("1", &[("x", MetricValue::Int(10))]),
            result("2", &[("y", MetricValue::Float(0.5))]),
        ];
        let text = render_csv(&rows, None);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "case_id,commit,metrics.x,metrics.y,ran_on,result_id");
        assert_eq!(lines[1], "1,abc,10,,1.5,1.500000_1");
        assert_eq!(lines[2], "2,abc,,0.5,1.5,1.500000_2");
    }

    #[test]
    fn fields_needing_quotes_are_quoted() {
        let text = render_csv(&[result("1", &[])], Some("case_input.path, status"));
        assert_eq!(text, "case_input.path,status\n\"in,put.png\",PASS\n");
    }

    #[test]
    fn unknown_paths_give_empty_cells() {
        let text = render_csv(&[result("1", &[])], Some("nope.deeper,context"));
        assert_eq!(text, "context,nope.deeper\n,\n");
    }
}
