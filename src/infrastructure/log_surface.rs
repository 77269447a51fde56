// Log surface - Headless chart that reports each redraw through tracing
use crate::application::chart_renderer::ChartSurface;
use crate::domain::chart::ChartFrame;
use crate::domain::error::RenderError;

#[derive(Debug, Default)]
pub struct LogSurface {
    last: Option<String>,
}

impl LogSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn summarize(frame: &ChartFrame) -> String {
    let series: Vec<String> = frame
        .series
        .iter()
        .map(|s| match s.latest() {
            Some(latest) => format!("vial {} od={:.3} ({} pts)", s.vial, latest.value, s.points.len()),
            None => format!("vial {} (no data)", s.vial),
        })
        .collect();

    format!(
        "{} [{:.3}, {:.3}] {} | {}",
        frame.title,
        frame.range.value_min,
        frame.range.value_max,
        if series.is_empty() { "no series".to_string() } else { series.join(", ") },
        frame.caption
    )
}

impl ChartSurface for LogSurface {
    fn draw(&mut self, frame: &ChartFrame) -> Result<(), RenderError> {
        let summary = summarize(frame);
        // identical frames are not worth a log line
        if self.last.as_deref() != Some(summary.as_str()) {
            tracing::info!("{}", summary);
            self.last = Some(summary);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chart::{AxisRange, SeriesData, TimeSeriesPoint};

    #[test]
    fn test_summarize() {
        let frame = ChartFrame {
            title: "OD".to_string(),
            caption: "connected".to_string(),
            range: AxisRange::neutral(),
            series: vec![
                SeriesData::new(1, vec![TimeSeriesPoint::new(0, 0.25)]),
                SeriesData::new(4, vec![]),
            ],
        };
        assert_eq!(
            summarize(&frame),
            "OD [0.000, 1.000] vial 1 od=0.250 (1 pts), vial 4 (no data) | connected"
        );
    }
}
