// Status board - Connection, actuator and poll status shown beside the chart
use crate::domain::connection::ConnectionState;
use crate::domain::device::{PumpStatus, ValveStatus};
use crate::domain::error::PollError;
use crate::domain::experiment::ExperimentSummary;
use crate::domain::sample::VialId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    pub connection: ConnectionState,
    pub gave_up: bool,
    pub experiment: Option<ExperimentSummary>,
    /// pump id -> running
    pub pumps: BTreeMap<u32, bool>,
    /// valve id -> open
    pub valves: BTreeMap<u32, bool>,
    pub poll_errors: BTreeMap<VialId, PollError>,
}

impl StatusBoard {
    pub fn set_connection(&mut self, state: ConnectionState) {
        self.connection = state;
        if state.is_connected() {
            self.gave_up = false;
        }
    }

    pub fn record_pump(&mut self, status: &PumpStatus) {
        self.pumps.insert(status.pump, status.active);
    }

    pub fn record_valve(&mut self, status: &ValveStatus) {
        self.valves.insert(status.valve, status.open);
    }

    pub fn record_poll(&mut self, vial: VialId, result: Result<(), PollError>) {
        match result {
            Ok(()) => {
                self.poll_errors.remove(&vial);
            }
            Err(error) => {
                self.poll_errors.insert(vial, error);
            }
        }
    }

    /// One-line summary, e.g. `connected | #3 run | pumps 1:on | valves 2:open`.
    pub fn caption(&self) -> String {
        let mut parts = Vec::new();

        if self.gave_up {
            parts.push(format!("disconnected (gave up, {})", self.connection));
        } else {
            parts.push(self.connection.to_string());
        }

        match &self.experiment {
            Some(experiment) => parts.push(experiment.display_name()),
            None => parts.push("no active experiment".to_string()),
        }

        if !self.pumps.is_empty() {
            let pumps: Vec<String> = self
                .pumps
                .iter()
                .map(|(id, active)| format!("{}:{}", id, if *active { "on" } else { "off" }))
                .collect();
            parts.push(format!("pumps {}", pumps.join(" ")));
        }

        if !self.valves.is_empty() {
            let valves: Vec<String> = self
                .valves
                .iter()
                .map(|(id, open)| format!("{}:{}", id, if *open { "open" } else { "closed" }))
                .collect();
            parts.push(format!("valves {}", valves.join(" ")));
        }

        if !self.poll_errors.is_empty() {
            let vials: Vec<String> = self.poll_errors.keys().map(|v| v.to_string()).collect();
            parts.push(format!("poll failing for vial {}", vials.join(",")));
        }

        parts.join(" | ")
    }
}
