// Time series domain models
use serde::Serialize;

/// Fallback name for a series whose labels produce nothing printable.
pub const UNNAMED_SERIES: &str = "Series";

/// Colors handed out to series in first-seen order, wrapping when exhausted.
pub const PALETTE: [&str; 10] = [
    "#7eb26d", "#eab839", "#6ed0e0", "#ef843c", "#e24d42", "#1f78c1", "#ba43a9", "#705da0",
    "#508642", "#cca300",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataPoint {
    pub timestamp: i64,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color_index: usize,
    pub color: &'static str,
}

impl Series {
    /// Create an empty series taking the palette slot for the `ordinal`-th series.
    pub fn new(name: String, ordinal: usize) -> Self {
        let color_index = ordinal % PALETTE.len();
        Self {
            name,
            points: Vec::new(),
            color_index,
            color: PALETTE[color_index],
        }
    }

    pub fn push(&mut self, point: DataPoint) {
        self.points.push(point);
    }

    /// Stable sort so equal timestamps keep arrival order.
    pub fn sort_points(&mut self) {
        self.points.sort_by_key(|p| p.timestamp);
    }
}
