// Poller - Snapshot pulls that seed and repair the store
use crate::application::backend::{MonitorBackend, PlotSnapshot};
use crate::application::session::SessionEvent;
use crate::domain::error::PollError;
use crate::domain::sample::{Sample, VialId, parse_timestamp};
use futures::StreamExt;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_stream::wrappers::IntervalStream;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Why a poll round was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollReason {
    Activation,
    Reconnected,
    Tick,
}

pub struct Poller {
    backend: Arc<dyn MonitorBackend>,
    vials: Vec<VialId>,
    interval: Duration,
    events: mpsc::Sender<SessionEvent>,
}

impl Poller {
    pub fn new(
        backend: Arc<dyn MonitorBackend>,
        vials: Vec<VialId>,
        interval: Duration,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            backend,
            vials,
            interval,
            events,
        }
    }

    /// Fetch the authoritative history of one vial.
    pub async fn poll_once(&self, vial: VialId) -> Result<Vec<Sample>, PollError> {
        let snapshot = self.backend.plot(vial).await?;
        Ok(snapshot_to_samples(vial, &snapshot))
    }

    /// Poll every monitored vial concurrently. Each vial's outcome is sent on
    /// its own, so one failure never hides another vial's data.
    ///
    /// Returns `false` once the session stopped listening.
    pub async fn poll_all(&self, reason: PollReason) -> bool {
        tracing::debug!("Polling {} vials ({:?})", self.vials.len(), reason);

        let results = join_all(
            self.vials
                .iter()
                .map(|&vial| async move { (vial, self.poll_once(vial).await) }),
        )
        .await;

        for (vial, result) in results {
            let event = match result {
                Ok(samples) => {
                    tracing::debug!("Snapshot for vial {}: {} samples", vial, samples.len());
                    SessionEvent::Snapshot { vial, samples }
                }
                Err(error) => {
                    tracing::warn!("Poll for vial {} failed: {}", vial, error);
                    SessionEvent::PollFailed { vial, error }
                }
            };
            if self.events.send(event).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Report the active experiment when it differs from what the session
    /// last heard. `known` is `None` until the first successful query.
    ///
    /// Returns `false` once the session stopped listening.
    async fn refresh_experiment(&self, known: &mut Option<Option<i64>>) -> bool {
        let experiment = match self.backend.active_experiment().await {
            Ok(experiment) => experiment,
            Err(error) => {
                tracing::warn!("Could not fetch active experiment: {}", error);
                return true;
            }
        };

        let id = experiment.as_ref().map(|e| e.id);
        if *known == Some(id) {
            return true;
        }
        match &experiment {
            Some(e) => tracing::info!("Active experiment: {}", e.display_name()),
            None => tracing::info!("No active experiment"),
        }
        *known = Some(id);
        self.events.send(SessionEvent::Experiment(experiment)).await.is_ok()
    }

    /// Activation round, then one round per tick or seed trigger. Every
    /// round first checks whether the active experiment changed.
    pub async fn run(self, mut triggers: mpsc::Receiver<PollReason>) {
        let mut experiment = None;

        if !self.refresh_experiment(&mut experiment).await || !self.poll_all(PollReason::Activation).await {
            return;
        }

        let mut interval = interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);
        let mut triggers_open = true;

        loop {
            let reason = tokio::select! {
                _ = ticks.next() => PollReason::Tick,
                trigger = triggers.recv(), if triggers_open => match trigger {
                    Some(reason) => reason,
                    None => {
                        triggers_open = false;
                        continue;
                    }
                },
            };

            if !self.refresh_experiment(&mut experiment).await || !self.poll_all(reason).await {
                tracing::debug!("Session closed, poller stopping");
                return;
            }
        }
    }
}

/// Zip the parallel arrays of a plot snapshot into samples. Rows with a
/// missing value or an unreadable timestamp are skipped.
pub fn snapshot_to_samples(vial: VialId, snapshot: &PlotSnapshot) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(snapshot.times.len());

    for (index, (time, od)) in snapshot.times.iter().zip(&snapshot.ods).enumerate() {
        let Some(od) = *od else {
            continue;
        };
        let sample = parse_timestamp(time).and_then(|timestamp| Sample::new(vial, timestamp, od));
        match sample {
            Ok(sample) => samples.push(
                sample
                    .with_drug_concentration(snapshot.drug_concentrations.get(index).copied().flatten())
                    .with_growth_rate(snapshot.growth_rates.get(index).copied().flatten()),
            ),
            Err(error) => tracing::debug!("Skipping snapshot row {} for vial {}: {}", index, vial, error),
        }
    }

    samples
}
