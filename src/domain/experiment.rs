// Experiment domain models - What the backend reports about itself
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExperimentSummary {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl ExperimentSummary {
    pub fn display_name(&self) -> String {
        Self::format_name(self.id, &self.name)
    }

    fn format_name(id: i64, name: &str) -> String {
        // "Experiment_20240301_120000" -> "#3 Experiment 20240301 120000"
        format!("#{} {}", id, name.trim_end_matches('_').replace('_', " "))
    }
}

/// Body of `GET /experiments/active`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveExperiment {
    pub experiment: Option<ExperimentSummary>,
}

/// Body of `GET /service/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}
