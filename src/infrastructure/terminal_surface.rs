// Terminal surface - ratatui chart of every vial's optical density
use crate::application::chart_renderer::ChartSurface;
use crate::domain::chart::ChartFrame;
use crate::domain::error::RenderError;
use chrono::DateTime;
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::crossterm::{cursor, execute, terminal};
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::Line;
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType};
use std::io::{self, Stdout};

const PALETTE: [Color; 7] = [
    Color::Cyan,
    Color::Magenta,
    Color::Yellow,
    Color::Green,
    Color::LightRed,
    Color::LightBlue,
    Color::White,
];

pub struct TerminalSurface<B: Backend> {
    terminal: Terminal<B>,
}

impl<B: Backend> TerminalSurface<B> {
    pub fn new(backend: B) -> io::Result<Self> {
        Ok(Self {
            terminal: Terminal::new(backend)?,
        })
    }

    pub fn backend(&self) -> &B {
        self.terminal.backend()
    }
}

impl TerminalSurface<CrosstermBackend<Stdout>> {
    /// Draw on stdout inside the alternate screen. Call [`leave_screen`]
    /// when the session is over.
    pub fn stdout() -> io::Result<Self> {
        let mut stdout = io::stdout();
        execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide)?;
        Self::new(CrosstermBackend::new(stdout))
    }
}

pub fn leave_screen() -> io::Result<()> {
    execute!(io::stdout(), terminal::LeaveAlternateScreen, cursor::Show)
}

fn clock(ms: f64) -> String {
    DateTime::from_timestamp_millis(ms as i64)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

impl<B: Backend + Send> ChartSurface for TerminalSurface<B> {
    fn draw(&mut self, frame: &ChartFrame) -> Result<(), RenderError> {
        let data: Vec<Vec<(f64, f64)>> = frame
            .series
            .iter()
            .map(|series| {
                series
                    .points
                    .iter()
                    .map(|p| (p.time_ms as f64, p.value))
                    .collect()
            })
            .collect();
        let range = frame.range;

        self.terminal
            .draw(|f| {
                let datasets: Vec<Dataset> = frame
                    .series
                    .iter()
                    .zip(&data)
                    .enumerate()
                    .map(|(index, (series, points))| {
                        let label = match series.latest() {
                            Some(latest) => format!("{} {:.3}", series.name, latest.value),
                            None => series.name.clone(),
                        };
                        Dataset::default()
                            .name(label)
                            .marker(Marker::Braille)
                            .graph_type(GraphType::Line)
                            .style(Style::default().fg(PALETTE[index % PALETTE.len()]))
                            .data(points)
                    })
                    .collect();

                let chart = Chart::new(datasets)
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title(frame.title.clone())
                            .title_bottom(Line::from(format!(" {} ", frame.caption))),
                    )
                    .x_axis(
                        Axis::default()
                            .title("time")
                            .bounds([range.time_min_ms, range.time_max_ms])
                            .labels(vec![clock(range.time_min_ms), clock(range.time_max_ms)]),
                    )
                    .y_axis(
                        Axis::default()
                            .title("OD")
                            .bounds([range.value_min, range.value_max])
                            .labels(vec![
                                format!("{:.2}", range.value_min),
                                format!("{:.2}", range.value_max),
                            ]),
                    );

                f.render_widget(chart, f.area());
            })
            .map_err(|e| RenderError::Surface(e.to_string()))?;

        Ok(())
    }
}
