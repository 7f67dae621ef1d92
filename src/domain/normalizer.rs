// Response normalization - any raw response shape into named series
use super::labels::{label_for, label_for_row};
use super::response::RawResponse;
use super::series::{DataPoint, Series};
use std::collections::HashMap;

/// Convert a raw backend response into series grouped by derived name.
///
/// Series come out in first-seen order with points sorted by timestamp.
/// NaN or infinite values and rows without a timestamp are dropped. An unrecognized
/// response yields no series.
pub fn normalize(response: &RawResponse, label_field: Option<&str>) -> Vec<Series> {
    let mut series: Vec<Series> = Vec::new();
    let mut index_by_name: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for observation in response.observations() {
        let Some(timestamp) = observation.timestamp else {
            skipped += 1;
            continue;
        };
        if !observation.value.is_finite() {
            skipped += 1;
            continue;
        }

        let name = match observation.raw_label.as_deref() {
            Some(raw) => label_for_row(&observation.labels, raw, label_field),
            None => label_for(&observation.labels, None, label_field),
        };
        let idx = *index_by_name.entry(name).or_insert_with_key(|name| {
            series.push(Series::new(name.clone(), series.len()));
            series.len() - 1
        });
        series[idx].push(DataPoint::new(timestamp, observation.value));
    }

    for s in &mut series {
        s.sort_points();
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} observations without a timestamp or value", skipped);
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(series: &[Series]) -> Vec<&str> {
        series.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_columnar_nan_dropped() {
        let response = RawResponse::from(json!({
            "fields": [
                { "name": "Time", "values": [1000, 2000] },
                { "name": "Series", "values": ["a", "a"] },
                { "name": "Value", "values": [5, "NaN"] }
            ]
        }));

        let series = normalize(&response, None);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "a");
        assert_eq!(series[0].points, vec![DataPoint::new(1000, 5.0)]);
    }

    #[test]
    fn test_tabular_nan_dropped_without_affecting_neighbours() {
        let response = RawResponse::from(json!({
            "schema": [{ "name": "time" }, { "name": "service" }, { "name": "value" }],
            "rows": [
                [3000, "cart", 3],
                [1000, "cart", "oops"],
                [2000, "cart", 2]
            ]
        }));

        let series = normalize(&response, None);
        assert_eq!(series.len(), 1);
        let timestamps: Vec<i64> = series[0].points.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![2000, 3000]);
    }

    #[test]
    fn test_label_keyed_scaled_and_sorted() {
        let response = RawResponse::from(json!([
            { "labels": { "service": "cart" }, "values": [[20, "2"], [10, "1"], [15, "NaN"]] },
            { "labels": { "service": "auth" }, "values": [[10, "7"]] }
        ]));

        let series = normalize(&response, None);
        assert_eq!(names(&series), vec!["cart", "auth"]);
        assert_eq!(
            series[0].points,
            vec![DataPoint::new(10_000, 1.0), DataPoint::new(20_000, 2.0)]
        );
        assert_eq!(series[1].color_index, 1);
    }

    #[test]
    fn test_rows_merge_by_derived_name() {
        let response = RawResponse::from(json!({
            "fields": [
                { "name": "Time", "values": [1, 2, 3] },
                { "name": "Series", "values": [
                    "{remoteService=\"cart\", operation=\"Add\"}",
                    "{remoteService=\"cart\", operation=\"Remove\"}",
                    "{remoteService=\"auth\", operation=\"Login\"}"
                ]},
                { "name": "Value", "values": [1, 2, 3] }
            ]
        }));

        let by_service = normalize(&response, None);
        assert_eq!(names(&by_service), vec!["cart", "auth"]);
        assert_eq!(by_service[0].points.len(), 2);

        let by_operation = normalize(&response, Some("operation"));
        assert_eq!(names(&by_operation), vec!["Add", "Remove", "Login"]);
    }

    #[test]
    fn test_unrecognized_is_empty() {
        let response = RawResponse::from(json!({ "message": "no data" }));
        assert!(normalize(&response, None).is_empty());
    }

    #[test]
    fn test_columnar_extra_columns_keep_series_apart() {
        let response = RawResponse::from(json!({
            "fields": [
                { "name": "Time", "values": [1000, 1000] },
                { "name": "Series", "values": ["a", "b"] },
                { "name": "Host", "values": ["h1", "h1"] },
                { "name": "Value", "values": [1, 2] }
            ]
        }));

        let series = normalize(&response, None);
        assert_eq!(names(&series), vec!["a", "b"]);
        assert_eq!(series[1].points, vec![DataPoint::new(1000, 2.0)]);

        let by_host = normalize(&response, Some("Host"));
        assert_eq!(names(&by_host), vec!["h1"]);
        assert_eq!(by_host[0].points.len(), 2);
    }

    #[test]
    fn test_infinite_values_dropped() {
        let response = RawResponse::from(json!({
            "fields": [
                { "name": "Time", "values": [1000, 2000, 3000] },
                { "name": "Series", "values": ["a", "a", "a"] },
                { "name": "Value", "values": ["+Inf", 4, "-inf"] }
            ]
        }));

        let series = normalize(&response, None);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].points, vec![DataPoint::new(2000, 4.0)]);
    }
}
