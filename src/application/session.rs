// Monitoring session - Owns the store and wires the pipeline together
use crate::application::backend::MonitorBackend;
use crate::application::chart_renderer::{ChartRenderer, ChartSurface, RedrawThrottle};
use crate::application::connection_manager::{ChannelTransport, ConnectionManager, ReconnectPolicy};
use crate::application::poller::Poller;
use crate::application::range_calculator::compute_range;
use crate::application::status_board::StatusBoard;
use crate::application::time_series_store::TimeSeriesStore;
use crate::domain::connection::ConnectionState;
use crate::domain::device::{PumpStatus, ValveStatus};
use crate::domain::error::PollError;
use crate::domain::experiment::ExperimentSummary;
use crate::domain::sample::{Sample, VialId};
use crate::infrastructure::config::MonitorSettings;
use std::sync::Arc;
use tokio::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const EVENT_QUEUE_DEPTH: usize = 1024;
const SEED_QUEUE_DEPTH: usize = 4;

/// Everything the session loop reacts to. Producers are the connection
/// manager and the poller; the loop is the only consumer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connection(ConnectionState),
    ReconnectExhausted { attempts: u32 },
    Sample(Sample),
    PumpStatus(PumpStatus),
    ValveStatus(ValveStatus),
    Experiment(Option<ExperimentSummary>),
    Snapshot { vial: VialId, samples: Vec<Sample> },
    PollFailed { vial: VialId, error: PollError },
}

/// State owned by the session loop. Sole writer of the store.
pub struct SessionCore {
    store: TimeSeriesStore,
    renderer: ChartRenderer,
    status: StatusBoard,
    throttle: RedrawThrottle,
    dedupe_timestamps: bool,
}

impl SessionCore {
    pub fn new(settings: &MonitorSettings, surface: Box<dyn ChartSurface>) -> Self {
        Self {
            store: TimeSeriesStore::new(settings.capacity),
            renderer: ChartRenderer::new(surface, settings.title.clone()),
            status: StatusBoard::default(),
            throttle: RedrawThrottle::new(settings.redraw_interval()),
            dedupe_timestamps: settings.dedupe_timestamps,
        }
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn into_store(self) -> TimeSeriesStore {
        self.store
    }

    /// Apply one event. Returns whether the chart changed.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Sample(sample) => {
                let vial = sample.vial;
                if self.dedupe_timestamps {
                    let stored = self.store.append_unique(vial, sample);
                    if !stored {
                        tracing::debug!("Dropping duplicate sample for vial {}", vial);
                    }
                    stored
                } else {
                    self.store.append(vial, sample);
                    true
                }
            }
            SessionEvent::Snapshot { vial, samples } => {
                self.store.replace(vial, samples);
                self.status.record_poll(vial, Ok(()));
                true
            }
            SessionEvent::PollFailed { vial, error } => {
                self.status.record_poll(vial, Err(error));
                true
            }
            SessionEvent::Connection(state) => {
                self.status.set_connection(state);
                true
            }
            SessionEvent::ReconnectExhausted { attempts } => {
                tracing::error!("Live channel lost after {} attempts", attempts);
                self.status.gave_up = true;
                true
            }
            SessionEvent::PumpStatus(status) => {
                tracing::debug!(
                    "Pump {} {} at {}",
                    status.pump,
                    if status.active { "on" } else { "off" },
                    status.timestamp.as_deref().unwrap_or("?")
                );
                self.status.record_pump(&status);
                true
            }
            SessionEvent::ValveStatus(status) => {
                tracing::debug!(
                    "Valve {} {} at {}",
                    status.valve,
                    if status.open { "open" } else { "closed" },
                    status.timestamp.as_deref().unwrap_or("?")
                );
                self.status.record_valve(&status);
                true
            }
            SessionEvent::Experiment(experiment) => {
                let previous = self.status.experiment.as_ref().map(|e| e.id);
                let current = experiment.as_ref().map(|e| e.id);
                if previous.is_some() && previous != current {
                    tracing::info!("Active experiment changed, reinitializing chart");
                    self.store.clear();
                    self.renderer.reset();
                }
                self.status.experiment = experiment;
                true
            }
        }
    }

    pub fn handle(&mut self, event: SessionEvent, now: Instant) {
        if self.apply(event) && self.throttle.request(now) {
            self.redraw();
        }
    }

    /// Draw a redraw that the throttle deferred.
    pub fn flush(&mut self, now: Instant) {
        if self.throttle.flush(now) {
            self.redraw();
        }
    }

    pub fn redraw_deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    pub fn redraw(&mut self) {
        let range = compute_range(&self.store);
        self.renderer.set_caption(self.status.caption());
        if let Err(error) = self.renderer.render(&self.store, &range) {
            tracing::warn!("Redraw failed: {}", error);
        }
    }
}

async fn run_event_loop(
    mut core: SessionCore,
    mut events: mpsc::Receiver<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> SessionCore {
    core.redraw();

    loop {
        let deadline = core.redraw_deadline();
        let wake = deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => core.handle(event, Instant::now()),
                None => break,
            },
            _ = tokio::time::sleep_until(wake), if deadline.is_some() => core.flush(Instant::now()),
        }
    }

    // Anything still queued arrived after teardown.
    events.close();
    core
}

/// A running monitoring session: connection manager, poller and the loop
/// that owns the store. Dropping it stops all three tasks; use
/// [`shutdown`](Self::shutdown) to also get the store back.
pub struct MonitorSession {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ConnectionState>,
    event_loop: JoinHandle<SessionCore>,
    connection: JoinHandle<()>,
    poller: JoinHandle<()>,
}

impl MonitorSession {
    pub fn start(
        settings: &MonitorSettings,
        policy: ReconnectPolicy,
        backend: Arc<dyn MonitorBackend>,
        transport: Arc<dyn ChannelTransport>,
        surface: Box<dyn ChartSurface>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (seed_tx, seed_rx) = mpsc::channel(SEED_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let core = SessionCore::new(settings, surface);
        let manager = ConnectionManager::new(transport, policy, events_tx.clone(), seed_tx);
        let state = manager.subscribe();
        let poller = Poller::new(backend, settings.vials.clone(), settings.poll_interval(), events_tx);

        tracing::info!(
            "Monitoring vials {:?} (capacity {}, poll every {:?})",
            settings.vials,
            settings.capacity,
            settings.poll_interval()
        );

        Self {
            shutdown: shutdown_tx,
            state,
            event_loop: tokio::spawn(run_event_loop(core, events_rx, shutdown_rx)),
            connection: tokio::spawn(manager.run()),
            poller: tokio::spawn(poller.run(seed_rx)),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the poller timer, detach the channel and stop the loop. Returns
    /// the store as it was at teardown.
    pub async fn shutdown(mut self) -> TimeSeriesStore {
        self.connection.abort();
        self.poller.abort();
        let _ = self.shutdown.send(true);
        let _ = (&mut self.connection).await;
        let _ = (&mut self.poller).await;

        match (&mut self.event_loop).await {
            Ok(core) => {
                tracing::info!("Session closed");
                core.into_store()
            }
            Err(error) => {
                tracing::warn!("Session loop ended abnormally: {}", error);
                TimeSeriesStore::default()
            }
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.connection.abort();
        self.poller.abort();
        self.event_loop.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::testing::FakeBackend;
    use crate::application::chart_renderer::testing::RecordingSurface;
    use crate::application::connection_manager::InboundEvent;
    use crate::application::connection_manager::testing::{ScriptedTransport, fast_policy};
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn sample(vial: VialId, seconds: i64, od: f64) -> Sample {
        Sample::new(vial, at(seconds), od).unwrap()
    }

    fn settings(vials: Vec<VialId>) -> MonitorSettings {
        MonitorSettings {
            vials,
            redraw_interval_ms: 0,
            ..MonitorSettings::default()
        }
    }

    fn core(dedupe: bool) -> (SessionCore, RecordingSurface) {
        let surface = RecordingSurface::default();
        let settings = MonitorSettings {
            dedupe_timestamps: dedupe,
            ..settings(vec![1, 2])
        };
        (SessionCore::new(&settings, Box::new(surface.clone())), surface)
    }

    #[test]
    fn test_hundred_and_one_updates_evict_oldest() {
        let (mut core, surface) = core(true);
        for t in 0..=100 {
            core.handle(SessionEvent::Sample(sample(1, t, 0.01 * t as f64)), Instant::now());
        }

        let series = core.store().get(1);
        assert_eq!(series.len(), 100);
        assert_eq!(series.first().map(|s| s.timestamp), Some(at(1)));
        assert_eq!(series.last().map(|s| s.timestamp), Some(at(100)));
        assert_eq!(surface.frames().len(), 101);
    }

    #[test]
    fn test_poll_failure_leaves_other_vial_untouched() {
        let (mut core, _) = core(true);
        core.apply(SessionEvent::Sample(sample(2, 0, 0.9)));

        core.apply(SessionEvent::Snapshot {
            vial: 1,
            samples: vec![sample(1, 0, 0.1), sample(1, 1, 0.2)],
        });
        core.apply(SessionEvent::PollFailed {
            vial: 2,
            error: PollError::Request("timeout".to_string()),
        });

        assert_eq!(core.store().len(1), 2);
        assert_eq!(core.store().get(2), vec![sample(2, 0, 0.9)]);
        assert!(core.status().poll_errors.contains_key(&2));
        assert!(!core.status().poll_errors.contains_key(&1));
    }

    #[test]
    fn test_live_sample_after_snapshot_is_deduplicated() {
        let (mut deduped, _) = core(true);
        deduped.apply(SessionEvent::Snapshot {
            vial: 1,
            samples: vec![sample(1, 0, 0.1), sample(1, 1, 0.2)],
        });
        assert!(!deduped.apply(SessionEvent::Sample(sample(1, 1, 0.2))));
        assert!(deduped.apply(SessionEvent::Sample(sample(1, 2, 0.3))));
        assert_eq!(deduped.store().len(1), 3);

        let (mut raw, _) = core(false);
        raw.apply(SessionEvent::Snapshot {
            vial: 1,
            samples: vec![sample(1, 1, 0.2)],
        });
        raw.apply(SessionEvent::Sample(sample(1, 1, 0.2)));
        assert_eq!(raw.store().len(1), 2);
    }

    #[test]
    fn test_experiment_change_reinitializes_chart() {
        let (mut core, surface) = core(true);
        let experiment = |id| {
            Some(ExperimentSummary {
                id,
                name: "run".to_string(),
                status: None,
            })
        };

        core.apply(SessionEvent::Experiment(experiment(1)));
        core.apply(SessionEvent::Sample(sample(1, 0, 0.1)));
        core.apply(SessionEvent::Experiment(experiment(1)));
        assert_eq!(core.store().len(1), 1);

        core.apply(SessionEvent::Experiment(experiment(2)));
        assert!(core.store().is_empty());
        core.redraw();
        assert!(surface.frames().last().unwrap().series.is_empty());
    }

    #[test]
    fn test_status_events_reach_caption() {
        let (mut core, surface) = core(true);
        core.handle(SessionEvent::Connection(ConnectionState::Connected), Instant::now());
        core.handle(
            SessionEvent::PumpStatus(PumpStatus {
                pump: 1,
                active: true,
                timestamp: None,
            }),
            Instant::now(),
        );
        let caption = surface.frames().last().unwrap().caption.clone();
        assert!(caption.starts_with("connected"));
        assert!(caption.contains("pumps 1:on"));
        assert_eq!(core.store().vials(), Vec::<VialId>::new());
    }

    #[tokio::test]
    async fn test_events_after_teardown_are_discarded() {
        let surface = RecordingSurface::default();
        let core = SessionCore::new(&settings(vec![1]), Box::new(surface));
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        shutdown_tx.send(true).unwrap();
        tx.send(SessionEvent::Sample(sample(1, 0, 0.5))).await.unwrap();

        let core = run_event_loop(core, rx, shutdown_rx).await;
        assert!(core.store().is_empty());
        assert!(tx.send(SessionEvent::Sample(sample(1, 1, 0.5))).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_redraw_lands_after_interval() {
        let surface = RecordingSurface::default();
        let settings = MonitorSettings {
            redraw_interval_ms: 250,
            ..settings(vec![1])
        };
        let core = SessionCore::new(&settings, Box::new(surface.clone()));
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_loop = tokio::spawn(run_event_loop(core, rx, shutdown_rx));

        for (t, od) in [0.1, 0.2, 0.3, 0.4, 0.5].into_iter().enumerate() {
            tx.send(SessionEvent::Sample(sample(1, t as i64, od))).await.unwrap();
        }

        // Initial frame plus the first sample; the rest of the burst waits.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let frames = surface.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].point_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let frames = surface.frames();
        assert_eq!(frames.len(), 3);
        let last = &frames[2].series[0];
        assert_eq!(last.points.len(), 5);
        assert_eq!(last.latest().map(|p| p.value), Some(0.5));

        shutdown_tx.send(true).unwrap();
        event_loop.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_ingests_live_channel() {
        let events = (0..=100)
            .map(|t| InboundEvent::VialUpdate(sample(1, t, 0.5)))
            .collect();
        let transport = Arc::new(ScriptedTransport::new(1, events));
        let backend = Arc::new(FakeBackend::new());
        let surface = RecordingSurface::default();

        let session = MonitorSession::start(
            &settings(vec![1]),
            fast_policy(5),
            backend.clone(),
            transport,
            Box::new(surface.clone()),
        );

        let mut state = session.state_changes();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .expect("never connected")
        .unwrap();

        let filled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done = surface
                    .frames()
                    .last()
                    .and_then(|f| f.series.first().and_then(|s| s.latest().copied()))
                    .is_some_and(|p| p.time_ms == at(100).timestamp_millis());
                if done {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(filled.is_ok());
        assert_eq!(session.connection_state(), ConnectionState::Connected);

        let store = session.shutdown().await;
        assert_eq!(store.len(1), 100);
        assert_eq!(store.get(1)[0].timestamp, at(1));
        // activation poll plus the seed after connecting
        assert!(backend.plot_calls() >= 1);
    }

    #[tokio::test]
    async fn test_dropping_session_stops_its_tasks() {
        let transport = Arc::new(ScriptedTransport::new(0, vec![]));
        let backend = Arc::new(FakeBackend::new());

        let session = MonitorSession::start(
            &settings(vec![1, 2]),
            fast_policy(0),
            backend.clone(),
            transport.clone(),
            Box::new(RecordingSurface::default()),
        );
        let mut state = session.state_changes();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .expect("never connected")
        .unwrap();

        drop(session);

        let released = tokio::time::timeout(Duration::from_secs(5), async {
            while Arc::strong_count(&transport) > 1 || Arc::strong_count(&backend) > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(released.is_ok());
    }
}
