// Time range resolution - relative or absolute expressions into epoch seconds
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            from: "now-6h".to_string(),
            to: "now".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start_epoch_seconds: i64,
    pub end_epoch_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeRangeError {
    #[error("cannot parse time expression '{0}'")]
    Unparseable(String),
    #[error("time range starts after it ends ({from} > {to})")]
    Inverted { from: i64, to: i64 },
}

/// Resolve `range` against `now`.
///
/// Accepts `now`, `now-<n><unit>` with units s, m, h, d, w, epoch millis,
/// or RFC 3339 timestamps.
pub fn resolve(range: &TimeRange, now: DateTime<Utc>) -> Result<TimeWindow, TimeRangeError> {
    let from = resolve_point(&range.from, now)?;
    let to = resolve_point(&range.to, now)?;
    if from > to {
        return Err(TimeRangeError::Inverted { from, to });
    }
    Ok(TimeWindow {
        start_epoch_seconds: from,
        end_epoch_seconds: to,
    })
}

fn resolve_point(expr: &str, now: DateTime<Utc>) -> Result<i64, TimeRangeError> {
    let expr = expr.trim();
    let unparseable = || TimeRangeError::Unparseable(expr.to_string());

    if expr == "now" {
        return Ok(now.timestamp());
    }

    if let Some(offset) = expr.strip_prefix("now-") {
        let split = offset
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(unparseable)?;
        let (amount, unit) = offset.split_at(split);
        let amount: i64 = amount.parse().map_err(|_| unparseable())?;
        let duration = match unit {
            "s" => Duration::try_seconds(amount),
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            "w" => Duration::try_weeks(amount),
            _ => None,
        }
        .ok_or_else(unparseable)?;
        return Ok((now - duration).timestamp());
    }

    if let Ok(millis) = expr.parse::<i64>() {
        return Ok(millis.div_euclid(1000));
    }

    DateTime::parse_from_rfc3339(expr)
        .map(|t| t.timestamp())
        .map_err(|_| unparseable())
}
