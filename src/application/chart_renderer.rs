// Chart renderer - Turns store contents into frames for a surface
use crate::application::time_series_store::TimeSeriesStore;
use crate::domain::chart::{AxisRange, ChartFrame, SeriesData, TimeSeriesPoint};
use crate::domain::error::RenderError;
use crate::domain::sample::VialId;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;

/// Where frames end up: a terminal, a log, a test recorder.
pub trait ChartSurface: Send {
    fn draw(&mut self, frame: &ChartFrame) -> Result<(), RenderError>;
}

pub struct ChartRenderer {
    surface: Box<dyn ChartSurface>,
    title: String,
    caption: String,
    known_vials: BTreeSet<VialId>,
}

impl ChartRenderer {
    pub fn new(surface: Box<dyn ChartSurface>, title: impl Into<String>) -> Self {
        Self {
            surface,
            title: title.into(),
            caption: String::new(),
            known_vials: BTreeSet::new(),
        }
    }

    pub fn set_caption(&mut self, caption: impl Into<String>) {
        self.caption = caption.into();
    }

    /// Draw the current store. Vials seen once stay on the chart, even
    /// with an empty series.
    pub fn render(&mut self, store: &TimeSeriesStore, range: &AxisRange) -> Result<(), RenderError> {
        let frame = self.build_frame(store, range);
        self.surface.draw(&frame)
    }

    pub fn build_frame(&mut self, store: &TimeSeriesStore, range: &AxisRange) -> ChartFrame {
        for (vial, series) in store.iter() {
            if !series.is_empty() {
                self.known_vials.insert(vial);
            }
        }

        let series = self
            .known_vials
            .iter()
            .map(|&vial| {
                let points = store
                    .get(vial)
                    .iter()
                    .map(|s| TimeSeriesPoint::new(s.time_ms(), s.od))
                    .collect();
                SeriesData::new(vial, points)
            })
            .collect();

        ChartFrame {
            title: self.title.clone(),
            caption: self.caption.clone(),
            range: *range,
            series,
        }
    }

    /// Forget every series (chart reinitialization).
    pub fn reset(&mut self) {
        self.known_vials.clear();
    }
}

/// Coalesces redraw requests to at most one per `min_interval`. A request
/// that arrives too early is remembered and flushed at [`deadline`].
///
/// [`deadline`]: RedrawThrottle::deadline
#[derive(Debug, Clone)]
pub struct RedrawThrottle {
    min_interval: Duration,
    last_draw: Option<Instant>,
    pending: bool,
}

impl RedrawThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_draw: None,
            pending: false,
        }
    }

    /// Returns true when the caller should draw right away.
    pub fn request(&mut self, now: Instant) -> bool {
        let due = match self.last_draw {
            Some(last) => now.duration_since(last) >= self.min_interval,
            None => true,
        };
        if due {
            self.last_draw = Some(now);
            self.pending = false;
        } else {
            self.pending = true;
        }
        due
    }

    pub fn deadline(&self) -> Option<Instant> {
        match (self.pending, self.last_draw) {
            (true, Some(last)) => Some(last + self.min_interval),
            _ => None,
        }
    }

    /// Called at the deadline; true if a deferred redraw is owed.
    pub fn flush(&mut self, now: Instant) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.last_draw = Some(now);
        true
    }
}
