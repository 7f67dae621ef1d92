// Raw backend response shapes and observation extraction
use super::labels::parse_label_string;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const TIME_FIELDS: &[&str] = &["Time", "time", "@timestamp", "timestamp", "Timestamp"];
const SERIES_FIELDS: &[&str] = &["Series", "series", "Metric", "metric"];
const VALUE_FIELDS: &[&str] = &["Value", "value", "Values", "values"];

/// One of the response shapes a metrics backend can return.
///
/// The shape is probed once in [`RawResponse::from`] and everything
/// downstream matches on the variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum RawResponse {
    /// Named, equal-length field arrays (`fields: [{ name, values }]`)
    Columnar(ColumnarFrame),
    /// Column descriptors plus row arrays
    Tabular(TabularFrame),
    /// Label maps each carrying `[seconds, "value"]` samples
    LabelKeyed(Vec<LabeledSeries>),
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnarFrame {
    pub fields: Vec<ColumnarField>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnarField {
    pub name: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TabularFrame {
    pub schema: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabeledSeries {
    #[serde(alias = "metric", default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(Value, Value)>,
    #[serde(default)]
    pub value: Option<(Value, Value)>,
}

/// A single `(labels, timestamp, value)` row lifted out of any response shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Epoch millis; `None` when the row has no parseable timestamp
    pub timestamp: Option<i64>,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
    /// Embedded series identifier, columnar form only
    pub raw_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Envelope,
    Columnar,
    Tabular,
    LabelKeyed,
    Unrecognized,
}

fn probe(value: &Value) -> Shape {
    match value {
        Value::Object(map) => {
            if map
                .get("data")
                .and_then(|d| d.get("result"))
                .is_some_and(Value::is_array)
            {
                Shape::Envelope
            } else if map.get("fields").is_some_and(Value::is_array) {
                Shape::Columnar
            } else if map.contains_key("schema") && map.get("rows").is_some_and(Value::is_array) {
                Shape::Tabular
            } else {
                Shape::Unrecognized
            }
        }
        Value::Array(items) => {
            let labeled = items.iter().all(|item| {
                item.as_object()
                    .is_some_and(|o| o.contains_key("labels") || o.contains_key("metric"))
            });
            if labeled {
                Shape::LabelKeyed
            } else {
                Shape::Unrecognized
            }
        }
        _ => Shape::Unrecognized,
    }
}

impl From<Value> for RawResponse {
    fn from(value: Value) -> Self {
        let shape = probe(&value);
        let decoded = match shape {
            Shape::Envelope => {
                let mut value = value;
                let inner = value
                    .get_mut("data")
                    .and_then(|d| d.get_mut("result"))
                    .map(Value::take)
                    .unwrap_or(Value::Null);
                return RawResponse::from(inner);
            }
            Shape::Columnar => serde_json::from_value(value).map(RawResponse::Columnar),
            Shape::Tabular => {
                let mut value = value;
                // Accept `schema: { fields: [...] }` as well as a bare descriptor list
                if let Some(schema) = value.get_mut("schema") {
                    if let Some(fields) = schema.get_mut("fields").map(Value::take) {
                        *schema = fields;
                    }
                }
                serde_json::from_value(value).map(RawResponse::Tabular)
            }
            Shape::LabelKeyed => serde_json::from_value(value).map(RawResponse::LabelKeyed),
            Shape::Unrecognized => {
                tracing::warn!("Unrecognized response shape, treating as empty");
                return RawResponse::Unrecognized;
            }
        };

        decoded.unwrap_or_else(|e| {
            tracing::warn!("Malformed {:?} response, treating as empty: {}", shape, e);
            RawResponse::Unrecognized
        })
    }
}

impl RawResponse {
    /// Flatten the response into rows. Rows whose value is not numeric are
    /// kept with a NaN value so callers decide how to treat them.
    pub fn observations(&self) -> Vec<Observation> {
        match self {
            RawResponse::Columnar(frame) => columnar_observations(frame),
            RawResponse::Tabular(frame) => tabular_observations(frame),
            RawResponse::LabelKeyed(entries) => label_keyed_observations(entries),
            RawResponse::Unrecognized => Vec::new(),
        }
    }
}

fn find_index<'a, I>(names: I, aliases: &[&str]) -> Option<usize>
where
    I: Iterator<Item = &'a str> + Clone,
{
    aliases
        .iter()
        .find_map(|alias| names.clone().position(|name| name == *alias))
}

fn columnar_observations(frame: &ColumnarFrame) -> Vec<Observation> {
    let names = frame.fields.iter().map(|f| f.name.as_str());
    let time_idx = find_index(names.clone(), TIME_FIELDS);
    let series_idx = find_index(names.clone(), SERIES_FIELDS);
    let value_idx = find_index(names, VALUE_FIELDS).or_else(|| {
        (0..frame.fields.len()).find(|i| Some(*i) != time_idx && Some(*i) != series_idx)
    });

    let Some(value_idx) = value_idx else {
        return Vec::new();
    };

    let row_count = frame.fields.iter().map(|f| f.values.len()).min().unwrap_or(0);
    if frame.fields.iter().any(|f| f.values.len() != row_count) {
        tracing::debug!("Columnar fields differ in length, truncating to {} rows", row_count);
    }

    (0..row_count)
        .map(|row| {
            let raw_label = series_idx.and_then(|i| label_text(&frame.fields[i].values[row]));
            let mut labels = raw_label
                .as_deref()
                .map(parse_label_string)
                .unwrap_or_default();

            for (i, field) in frame.fields.iter().enumerate() {
                if Some(i) == time_idx || Some(i) == series_idx || i == value_idx {
                    continue;
                }
                if let Some(text) = label_text(&field.values[row]) {
                    labels.entry(field.name.clone()).or_insert(text);
                }
            }

            Observation {
                timestamp: time_idx.and_then(|i| parse_millis(&frame.fields[i].values[row])),
                value: parse_value(&frame.fields[value_idx].values[row]),
                labels,
                raw_label,
            }
        })
        .collect()
}

fn tabular_observations(frame: &TabularFrame) -> Vec<Observation> {
    let names = frame.schema.iter().map(|c| c.name.as_str());
    let time_idx = find_index(names.clone(), TIME_FIELDS);
    let value_idx = find_index(names, VALUE_FIELDS)
        .or_else(|| (0..frame.schema.len()).rev().find(|i| Some(*i) != time_idx));

    let Some(value_idx) = value_idx else {
        return Vec::new();
    };

    frame
        .rows
        .iter()
        .map(|row| {
            let labels = frame
                .schema
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != time_idx && *i != value_idx)
                .filter_map(|(i, column)| {
                    row.get(i)
                        .and_then(label_text)
                        .map(|text| (column.name.clone(), text))
                })
                .collect();

            Observation {
                timestamp: time_idx.and_then(|i| row.get(i)).and_then(parse_millis),
                value: row.get(value_idx).map(parse_value).unwrap_or(f64::NAN),
                labels,
                raw_label: None,
            }
        })
        .collect()
}

fn label_keyed_observations(entries: &[LabeledSeries]) -> Vec<Observation> {
    entries
        .iter()
        .flat_map(|entry| {
            entry
                .values
                .iter()
                .chain(entry.value.iter())
                .map(move |(seconds, value)| Observation {
                    timestamp: parse_seconds(seconds),
                    value: parse_value(value),
                    labels: entry.labels.clone(),
                    raw_label: None,
                })
        })
        .collect()
}

fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a numeric cell. Strings are parsed as floats; anything else,
/// including infinities, is NaN.
fn parse_value(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(f64::NAN)
}

/// Epoch millis from a number, a numeric string, or an RFC 3339 timestamp.
fn parse_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .map(|f| f.round() as i64)
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|t| t.timestamp_millis())
            }),
        _ => None,
    }
}

fn parse_seconds(value: &Value) -> Option<i64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    seconds
        .is_finite()
        .then(|| (seconds * 1000.0).round() as i64)
}
