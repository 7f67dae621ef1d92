// Series labeling - derives display names from label sets
use super::series::UNNAMED_SERIES;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Label keys consulted in order when no explicit field is requested.
/// Remote-entity and operation labels outrank generic service labels; the
/// technical labels at the tail are a last resort.
pub const LABEL_PRIORITY: &[&str] = &[
    "RemoteService",
    "remoteService",
    "remote_service",
    "Operation",
    "operation",
    "Service",
    "service",
    "Method",
    "method",
    "job",
    "instance",
    "__name__",
];

static LABEL_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w.@-]+)="((?:[^"\\]|\\.)*)""#).expect("label pair pattern should be valid")
});
static ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(.)").expect("escape pattern should be valid"));

/// Parse every `key="value"` pair embedded in a label string such as
/// `{remoteService="cart", operation="AddItem"}`. A string without pairs
/// parses to an empty map.
pub fn parse_label_string(raw: &str) -> BTreeMap<String, String> {
    LABEL_PAIR
        .captures_iter(raw)
        .map(|caps| {
            let value = ESCAPE.replace_all(&caps[2], "$1");
            (caps[1].to_string(), value.into_owned())
        })
        .collect()
}

/// Name for a row that carries an embedded series identifier.
///
/// Only a requested field may come from the row's other columns; every other
/// rule looks at the pairs parsed out of `raw`, so rows with distinct
/// identifiers never collapse onto a shared column value.
pub fn label_for_row(
    row_labels: &BTreeMap<String, String>,
    raw: &str,
    requested_field: Option<&str>,
) -> String {
    if let Some(value) = requested_field
        .and_then(|field| row_labels.get(field))
        .filter(|v| !v.is_empty())
    {
        return value.clone();
    }
    label_for(&parse_label_string(raw), Some(raw), requested_field)
}

/// Resolve a series name from a label map.
///
/// An explicitly requested field wins when present, then [`LABEL_PRIORITY`],
/// then the lone label of a single-label set. Otherwise the raw identifier is
/// returned unchanged, or a rendering of the whole label set when there is no
/// raw identifier. Never returns an empty string.
pub fn label_for(
    labels: &BTreeMap<String, String>,
    raw: Option<&str>,
    requested_field: Option<&str>,
) -> String {
    if let Some(name) = resolve(labels, requested_field) {
        return name;
    }

    match raw {
        Some(raw) if !raw.is_empty() => raw.to_string(),
        _ if !labels.is_empty() => render(labels),
        _ => UNNAMED_SERIES.to_string(),
    }
}

fn resolve(labels: &BTreeMap<String, String>, requested_field: Option<&str>) -> Option<String> {
    let present = |key: &str| labels.get(key).filter(|v| !v.is_empty()).cloned();

    if let Some(value) = requested_field.and_then(present) {
        return Some(value);
    }

    if let Some(value) = LABEL_PRIORITY.iter().find_map(|key| present(key)) {
        return Some(value);
    }

    if labels.len() == 1 {
        return labels.values().next().filter(|v| !v.is_empty()).cloned();
    }

    None
}

fn render(labels: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = labels
        .iter()
        .map(|(key, value)| format!("{}=\"{}\"", key, value))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}
