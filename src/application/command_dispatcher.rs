// Command dispatcher - Pump and valve requests, one attempt each
use crate::application::backend::MonitorBackend;
use crate::domain::device::{Ack, ActuatorCommand, ActuatorKind, CommandParameter};
use crate::domain::error::CommandError;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandDispatcher {
    backend: Arc<dyn MonitorBackend>,
}

impl CommandDispatcher {
    pub fn new(backend: Arc<dyn MonitorBackend>) -> Self {
        Self { backend }
    }

    /// Validate locally, then send a single request. Never retries.
    pub async fn dispatch(&self, command: ActuatorCommand) -> Result<Ack, CommandError> {
        let request = validate(&command)?;
        tracing::info!("Dispatching {}", command);

        let result = match request {
            DeviceRequest::Pump { pump, volume } => self.backend.activate_pump(pump, volume).await,
            DeviceRequest::Valve { valve, open } => self.backend.set_valve(valve, open).await,
        };

        match &result {
            Ok(ack) => tracing::info!("{} accepted: {}", command, ack.message),
            Err(error) => tracing::warn!("{} failed: {}", command, error),
        }
        result
    }
}

/// A command that passed local validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceRequest {
    Pump { pump: u32, volume: f64 },
    Valve { valve: u32, open: bool },
}

pub fn validate(command: &ActuatorCommand) -> Result<DeviceRequest, CommandError> {
    match (command.kind, command.parameter) {
        (ActuatorKind::Pump, CommandParameter::Volume(volume)) => {
            if !volume.is_finite() {
                return Err(CommandError::Invalid(format!(
                    "pump {} volume must be a number, got {}",
                    command.target, volume
                )));
            }
            if volume < 0.0 {
                return Err(CommandError::Invalid(format!(
                    "pump {} volume must not be negative, got {}",
                    command.target, volume
                )));
            }
            Ok(DeviceRequest::Pump {
                pump: command.target,
                volume,
            })
        }
        (ActuatorKind::Valve, CommandParameter::State(open)) => Ok(DeviceRequest::Valve {
            valve: command.target,
            open,
        }),
        (kind, parameter) => Err(CommandError::Invalid(format!(
            "{:?} {} does not take {:?}",
            kind, command.target, parameter
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::testing::FakeBackend;

    #[tokio::test]
    async fn test_negative_volume_rejected_without_network() {
        let backend = Arc::new(FakeBackend::new());
        let dispatcher = CommandDispatcher::new(backend.clone());

        let result = dispatcher.dispatch(ActuatorCommand::pump(1, -1.0)).await;

        assert!(matches!(result, Err(CommandError::Invalid(_))));
        assert_eq!(backend.command_calls(), 0);
    }

    #[tokio::test]
    async fn test_non_numeric_and_mismatched_parameters_rejected() {
        let backend = Arc::new(FakeBackend::new());
        let dispatcher = CommandDispatcher::new(backend.clone());

        assert!(dispatcher.dispatch(ActuatorCommand::pump(1, f64::NAN)).await.is_err());
        let mismatched = ActuatorCommand {
            kind: ActuatorKind::Valve,
            target: 2,
            parameter: CommandParameter::Volume(1.0),
        };
        assert!(matches!(
            dispatcher.dispatch(mismatched).await,
            Err(CommandError::Invalid(_))
        ));
        assert_eq!(backend.command_calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_error_surfaced_verbatim_once() {
        let backend = Arc::new(FakeBackend::new());
        *backend.command_result.lock().unwrap() = Err(CommandError::Rejected {
            status: 500,
            message: "Device not initialized".to_string(),
        });
        let dispatcher = CommandDispatcher::new(backend.clone());

        let error = dispatcher
            .dispatch(ActuatorCommand::valve(3, true))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "Device not initialized");
        assert_eq!(backend.command_calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_volume_is_sent() {
        let backend = Arc::new(FakeBackend::new());
        let dispatcher = CommandDispatcher::new(backend.clone());
        let ack = dispatcher.dispatch(ActuatorCommand::pump(1, 0.0)).await.unwrap();
        assert_eq!(ack.message, "ok");
        assert_eq!(backend.command_calls(), 1);
    }
}
