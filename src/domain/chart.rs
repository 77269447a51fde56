// Chart domain models - What a surface is asked to draw
use super::sample::VialId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// Axis bounds derived from the store. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub value_min: f64,
    pub value_max: f64,
    pub time_min_ms: f64,
    pub time_max_ms: f64,
}

impl AxisRange {
    /// Range used when there is nothing to show.
    pub fn neutral() -> Self {
        Self {
            value_min: 0.0,
            value_max: 1.0,
            time_min_ms: 0.0,
            time_max_ms: 1.0,
        }
    }

    pub fn value_span(&self) -> f64 {
        self.value_max - self.value_min
    }

    pub fn time_span_ms(&self) -> f64 {
        self.time_max_ms - self.time_min_ms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesData {
    pub vial: VialId,
    pub name: String,
    pub points: Vec<TimeSeriesPoint>,
}

impl SeriesData {
    pub fn new(vial: VialId, points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            vial,
            name: format!("Vial {}", vial),
            points,
        }
    }

    pub fn latest(&self) -> Option<&TimeSeriesPoint> {
        self.points.last()
    }
}

/// One redraw: every series the renderer knows about plus the axes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFrame {
    pub title: String,
    pub caption: String,
    pub range: AxisRange,
    pub series: Vec<SeriesData>,
}

impl ChartFrame {
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }
}
