// HTTP backend - reqwest adapter for the device server's query and command endpoints
use crate::application::backend::{MonitorBackend, PlotSnapshot};
use crate::domain::device::Ack;
use crate::domain::error::{CommandError, PollError};
use crate::domain::experiment::{ActiveExperiment, ExperimentSummary, ServiceStatus};
use crate::domain::sample::VialId;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PumpRequest {
    pump: u32,
    volume: f64,
}

#[derive(Debug, Serialize)]
struct ValveRequest {
    valve: u32,
    state: bool,
}

impl HttpBackend {
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PollError> {
        let response = self
            .client
            .get(self.url(path))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PollError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PollError::Status {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| status.to_string()),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PollError::Decode(e.to_string()))
    }

    async fn post_command<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Ack, CommandError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| CommandError::Unreachable(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(match error_message(&text) {
                Some(message) => CommandError::Rejected {
                    status: status.as_u16(),
                    message,
                },
                None => CommandError::from_status(status.as_u16()),
            });
        }

        // A success without a message is still a success.
        Ok(serde_json::from_str::<Ack>(&text).unwrap_or_else(|_| Ack {
            message: status.to_string(),
        }))
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|message| !message.is_empty())
}

#[async_trait]
impl MonitorBackend for HttpBackend {
    async fn active_experiment(&self) -> Result<Option<ExperimentSummary>, PollError> {
        let body: ActiveExperiment = self.get_json("/experiments/active").await?;
        Ok(body.experiment)
    }

    async fn plot(&self, vial: VialId) -> Result<PlotSnapshot, PollError> {
        let snapshot: PlotSnapshot = self.get_json(&format!("/plot/{}", vial)).await?;
        tracing::debug!("Fetched {} points for vial {}", snapshot.times.len(), vial);
        Ok(snapshot)
    }

    async fn service_status(&self) -> Result<ServiceStatus, PollError> {
        self.get_json("/service/status").await
    }

    async fn activate_pump(&self, pump: u32, volume: f64) -> Result<Ack, CommandError> {
        self.post_command("/device/pump", &PumpRequest { pump, volume }).await
    }

    async fn set_valve(&self, valve: u32, open: bool) -> Result<Ack, CommandError> {
        self.post_command("/device/valve", &ValveRequest { valve, state: open })
            .await
    }
}
