// Device domain models - Actuator commands and actuator feedback
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorKind {
    Pump,
    Valve,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandParameter {
    /// Dispense volume in mL.
    Volume(f64),
    /// `true` opens the valve.
    State(bool),
}

/// A user intent against one pump or valve. Lives only for a dispatch call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommand {
    pub kind: ActuatorKind,
    pub target: u32,
    pub parameter: CommandParameter,
}

impl ActuatorCommand {
    pub fn pump(pump: u32, volume: f64) -> Self {
        Self {
            kind: ActuatorKind::Pump,
            target: pump,
            parameter: CommandParameter::Volume(volume),
        }
    }

    pub fn valve(valve: u32, open: bool) -> Self {
        Self {
            kind: ActuatorKind::Valve,
            target: valve,
            parameter: CommandParameter::State(open),
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.parameter) {
            (ActuatorKind::Pump, CommandParameter::Volume(volume)) => {
                write!(f, "pump {} dispense {}mL", self.target, volume)
            }
            (ActuatorKind::Valve, CommandParameter::State(open)) => {
                write!(f, "valve {} {}", self.target, if open { "open" } else { "closed" })
            }
            (kind, parameter) => write!(f, "{:?} {} {:?}", kind, self.target, parameter),
        }
    }
}

/// Backend acknowledgement of an accepted command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ack {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PumpStatus {
    pub pump: u32,
    pub active: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValveStatus {
    pub valve: u32,
    pub open: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}
