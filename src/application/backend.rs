// Backend port - Query and command endpoints of the device server
use crate::domain::device::Ack;
use crate::domain::error::{CommandError, PollError};
use crate::domain::experiment::{ExperimentSummary, ServiceStatus};
use crate::domain::sample::VialId;
use async_trait::async_trait;
use serde::Deserialize;

/// Body of `GET /plot/{vial}`: parallel arrays, zipped pairwise.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlotSnapshot {
    pub times: Vec<String>,
    pub ods: Vec<Option<f64>>,
    #[serde(default)]
    pub drug_concentrations: Vec<Option<f64>>,
    #[serde(default)]
    pub growth_rates: Vec<Option<f64>>,
}

#[async_trait]
pub trait MonitorBackend: Send + Sync {
    /// Currently running experiment, if any
    async fn active_experiment(&self) -> Result<Option<ExperimentSummary>, PollError>;

    /// Full measurement history for one vial
    async fn plot(&self, vial: VialId) -> Result<PlotSnapshot, PollError>;

    async fn service_status(&self) -> Result<ServiceStatus, PollError>;

    async fn activate_pump(&self, pump: u32, volume: f64) -> Result<Ack, CommandError>;

    async fn set_valve(&self, valve: u32, open: bool) -> Result<Ack, CommandError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory backend with scripted answers.
    pub struct FakeBackend {
        pub experiment: Mutex<Option<ExperimentSummary>>,
        pub plots: Mutex<HashMap<VialId, Result<PlotSnapshot, PollError>>>,
        pub command_result: Mutex<Result<Ack, CommandError>>,
        pub plot_calls: AtomicUsize,
        pub command_calls: AtomicUsize,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self {
                experiment: Mutex::new(None),
                plots: Mutex::new(HashMap::new()),
                command_result: Mutex::new(Ok(Ack {
                    message: "ok".to_string(),
                })),
                plot_calls: AtomicUsize::new(0),
                command_calls: AtomicUsize::new(0),
            }
        }

        pub fn with_plot(self, vial: VialId, plot: Result<PlotSnapshot, PollError>) -> Self {
            self.plots.lock().unwrap().insert(vial, plot);
            self
        }

        pub fn plot_calls(&self) -> usize {
            self.plot_calls.load(Ordering::SeqCst)
        }

        pub fn command_calls(&self) -> usize {
            self.command_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MonitorBackend for FakeBackend {
        async fn active_experiment(&self) -> Result<Option<ExperimentSummary>, PollError> {
            Ok(self.experiment.lock().unwrap().clone())
        }

        async fn plot(&self, vial: VialId) -> Result<PlotSnapshot, PollError> {
            self.plot_calls.fetch_add(1, Ordering::SeqCst);
            self.plots
                .lock()
                .unwrap()
                .get(&vial)
                .cloned()
                .unwrap_or_else(|| {
                    Err(PollError::Status {
                        status: 404,
                        message: "No experiment selected".to_string(),
                    })
                })
        }

        async fn service_status(&self) -> Result<ServiceStatus, PollError> {
            Ok(ServiceStatus {
                status: "running".to_string(),
                timestamp: None,
                mode: Some("simulation".to_string()),
            })
        }

        async fn activate_pump(&self, _pump: u32, _volume: f64) -> Result<Ack, CommandError> {
            self.command_calls.fetch_add(1, Ordering::SeqCst);
            self.command_result.lock().unwrap().clone()
        }

        async fn set_valve(&self, _valve: u32, _open: bool) -> Result<Ack, CommandError> {
            self.command_calls.fetch_add(1, Ordering::SeqCst);
            self.command_result.lock().unwrap().clone()
        }
    }
}
