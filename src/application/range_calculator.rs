// Range calculator - Axis bounds derived from the store
use crate::application::time_series_store::TimeSeriesStore;
use crate::domain::chart::AxisRange;

/// Padding floor so a flat signal still gets some headroom.
const MIN_PADDING: f64 = 0.001;
/// Narrowest value axis ever produced.
const MIN_VALUE_RANGE: f64 = 0.1;
/// Fraction of the time span added on each side.
const TIME_PADDING_FRACTION: f64 = 0.05;
/// Padding for a time axis whose samples all share one instant.
const MIN_TIME_PADDING_MS: f64 = 1_000.0;

pub fn compute_range(store: &TimeSeriesStore) -> AxisRange {
    let mut value_bounds: Option<(f64, f64)> = None;
    let mut time_bounds: Option<(i64, i64)> = None;

    for (_, series) in store.iter() {
        for sample in series {
            let (lo, hi) = value_bounds.unwrap_or((sample.od, sample.od));
            value_bounds = Some((lo.min(sample.od), hi.max(sample.od)));

            let time = sample.time_ms();
            let (first, last) = time_bounds.unwrap_or((time, time));
            time_bounds = Some((first.min(time), last.max(time)));
        }
    }

    match (value_bounds, time_bounds) {
        (Some((min, max)), Some((first, last))) => {
            let (value_min, value_max) = value_domain(min, max);
            let (time_min_ms, time_max_ms) = time_domain(first, last);
            AxisRange {
                value_min,
                value_max,
                time_min_ms,
                time_max_ms,
            }
        }
        _ => AxisRange::neutral(),
    }
}

fn value_domain(min: f64, max: f64) -> (f64, f64) {
    let padding = (0.1 * (max - min)).max(MIN_PADDING);
    let value_min = (min - padding).max(0.0);
    let mut value_max = max + padding;
    if value_max - value_min < MIN_VALUE_RANGE {
        value_max = value_min + MIN_VALUE_RANGE;
    }
    (value_min, value_max)
}

fn time_domain(first_ms: i64, last_ms: i64) -> (f64, f64) {
    let span = (last_ms - first_ms) as f64;
    let padding = if span > 0.0 {
        span * TIME_PADDING_FRACTION
    } else {
        MIN_TIME_PADDING_MS
    };
    (first_ms as f64 - padding, last_ms as f64 + padding)
}
